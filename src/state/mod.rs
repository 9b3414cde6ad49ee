use crate::api::ApiClient;
use crate::config::EnvConfig;
use crate::models::User;
use crate::storage::load_user_from_storage;
use leptos::prelude::*;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: EnvConfig,
    pub api_client: RwSignal<ApiClient>,
    /// Signed-in account. `None` also when a stored user has no token.
    pub current_user: RwSignal<Option<User>>,
}

impl AppState {
    pub fn new() -> Self {
        let config = EnvConfig::new();
        let stored_client = ApiClient::load_from_storage(config.api_url.clone());

        let stored_user = if stored_client.is_authenticated() {
            load_user_from_storage()
        } else {
            None
        };

        Self {
            config,
            api_client: RwSignal::new(stored_client),
            current_user: RwSignal::new(stored_user),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);
