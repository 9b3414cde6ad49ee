use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque note identity.
///
/// Ids are either assigned by the store or generated client side (v4 UUID)
/// so a freshly created note can be rendered before the store confirms it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Creation timestamp in milliseconds. Sort key, newest first.
///
/// Never changes after creation: [`NotePatch`] has no field for it.
pub type OrderKey = i64;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    #[serde(rename = "order")]
    pub order_key: OrderKey,
    #[serde(rename = "owner-id")]
    pub owner_id: String,
}

/// Payload for `create`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewNote {
    pub id: NoteId,
    #[serde(rename = "owner-id")]
    pub owner_id: String,
    pub content: String,
    #[serde(rename = "order")]
    pub order_key: OrderKey,
}

/// Payload for `update`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeRecord {
    Added {
        id: NoteId,
        content: String,
        order_key: OrderKey,
    },
    Modified {
        id: NoteId,
        content: String,
        order_key: OrderKey,
    },
    Removed {
        id: NoteId,
    },
}

/// Records delivered together by the change stream, applied in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub records: Vec<ChangeRecord>,
    /// True while writes issued by this client have not been acknowledged.
    pub has_pending_writes: bool,
}

impl ChangeBatch {
    pub fn new(records: Vec<ChangeRecord>, has_pending_writes: bool) -> Self {
        Self {
            records,
            has_pending_writes,
        }
    }
}

/// Backend account info object.
///
/// Only `id` is required; the rest is kept opaque so new backend fields
/// don't break sign-in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
