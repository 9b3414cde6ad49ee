use crate::models::{NewNote, Note, NoteId, User};
use crate::storage::{clear_session_storage, load_token_from_storage, save_token_to_storage};
use crate::store::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

impl StoreError {
    fn network(e: reqwest::Error) -> Self {
        StoreError::Network(e.to_string())
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        StoreError::Parse(e.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct ListNotesRequest {
    #[serde(rename = "owner-id")]
    pub owner_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct UpdateNoteRequest {
    pub id: NoteId,
    pub content: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct DeleteNoteRequest {
    pub id: NoteId,
}

#[derive(Clone, Debug)]
pub(crate) struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            token: None,
        }
    }

    /// Client for `base_url`, signed in with the stored token if any.
    pub fn load_from_storage(base_url: String) -> Self {
        let mut client = Self::new(base_url);
        client.token = load_token_from_storage();
        client
    }

    pub fn save_to_storage(&self) {
        if let Some(token) = &self.token {
            save_token_to_storage(token);
        }
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn logout(&mut self) {
        self.token = None;
        clear_session_storage();
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    async fn send(&self, path: &str, body: &impl Serialize) -> StoreResult<reqwest::Response> {
        let client = reqwest::Client::new();
        let mut req = client.post(format!("{}{}", self.base_url, path));
        if let Some(header) = self.auth_header() {
            req = req.header("Authorization", header);
        }

        let res = req.json(body).send().await.map_err(StoreError::network)?;

        if res.status().is_success() {
            Ok(res)
        } else if res.status().as_u16() == 401 {
            Err(StoreError::Unauthorized)
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(StoreError::Http { status, body })
        }
    }

    async fn request_api<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> StoreResult<T> {
        self.send(path, body)
            .await?
            .json()
            .await
            .map_err(StoreError::parse)
    }

    pub async fn login(&self, email: &str, password: &str) -> StoreResult<LoginResponse> {
        self.request_api(
            "/login/web-login",
            &LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    pub async fn list_notes(&self, owner_id: &str) -> StoreResult<Vec<Note>> {
        let data: serde_json::Value = self
            .request_api(
                "/notes/list",
                &ListNotesRequest {
                    owner_id: owner_id.to_string(),
                },
            )
            .await?;
        Ok(Self::parse_note_list_response(data))
    }

    pub async fn create_note(&self, note: &NewNote) -> StoreResult<NoteId> {
        let data: serde_json::Value = self.request_api("/notes/create", note).await?;
        Self::parse_created_id(&data).ok_or_else(|| {
            StoreError::Parse(format!("create succeeded but response has no id: {data}"))
        })
    }

    pub async fn update_note(&self, id: &NoteId, content: &str) -> StoreResult<()> {
        // Body is ignored; some backends answer 204.
        self.send(
            "/notes/update",
            &UpdateNoteRequest {
                id: id.clone(),
                content: content.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn delete_note(&self, id: &NoteId) -> StoreResult<()> {
        self.send("/notes/delete", &DeleteNoteRequest { id: id.clone() })
            .await?;
        Ok(())
    }

    pub(crate) fn parse_created_id(data: &serde_json::Value) -> Option<NoteId> {
        data.get("id")
            .or_else(|| data.get("note").and_then(|n| n.get("id")))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(NoteId::from)
    }

    /// Rows missing an id are dropped; a missing order key sorts last.
    pub(crate) fn parse_note_list_response(data: serde_json::Value) -> Vec<Note> {
        let list = data
            .get("note-list")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut out: Vec<Note> = Vec::with_capacity(list.len());
        for item in list {
            if let Ok(note) = serde_json::from_value::<Note>(item.clone()) {
                out.push(note);
                continue;
            }

            let get_s = |k: &str| item.get(k).and_then(|v| v.as_str()).map(|s| s.to_string());

            let id = get_s("id").unwrap_or_default();
            if id.trim().is_empty() {
                continue;
            }

            out.push(Note {
                id: NoteId::new(id),
                content: get_s("content").unwrap_or_default(),
                order_key: item.get("order").and_then(|v| v.as_i64()).unwrap_or(0),
                owner_id: get_s("owner-id").unwrap_or_default(),
            });
        }

        out
    }
}
