//! Identity provider: sign-in, sign-out and the current user.
//!
//! The current user lives in [`AppState::current_user`]; components react
//! to sign-in/sign-out by tracking that signal.

use crate::models::User;
use crate::state::AppState;
use crate::storage::save_user_to_storage;
use crate::store::StoreResult;
use leptos::logging::log;
use leptos::prelude::*;

pub(crate) fn validate_credentials(email: &str, password: &str) -> Result<(), &'static str> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err("Email and password are required");
    }
    if !email.contains('@') {
        return Err("Enter a valid email address");
    }
    Ok(())
}

pub(crate) async fn sign_in(state: &AppState, email: &str, password: &str) -> StoreResult<User> {
    let mut client = state.api_client.get_untracked();
    let response = client.login(email.trim(), password).await?;

    client.set_token(response.token);
    client.save_to_storage();
    save_user_to_storage(&response.user);

    state.api_client.set(client);
    state.current_user.set(Some(response.user.clone()));
    log!("signed in as {}", response.user.id);
    Ok(response.user)
}

pub(crate) fn sign_out(state: &AppState) {
    state.api_client.update(|c| c.logout());
    state.current_user.set(None);
}
