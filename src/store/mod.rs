//! Remote note store and its change stream.
//!
//! The store is a black box to the rest of the crate: writes are
//! fire-and-forget futures, and every change (including the local echo of
//! our own writes) comes back through the subscription as a [`ChangeBatch`].

pub(crate) mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use http::HttpNoteStore;

use crate::models::{ChangeBatch, NewNote, NoteId, NotePatch};
use futures::future::LocalBoxFuture;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Receives change batches (or a delivery error) from a subscription.
pub type StreamSink = Box<dyn FnMut(StoreResult<ChangeBatch>)>;

pub trait NoteStore {
    fn create(&self, note: NewNote) -> LocalBoxFuture<'static, StoreResult<NoteId>>;

    fn update(&self, id: &NoteId, patch: NotePatch) -> LocalBoxFuture<'static, StoreResult<()>>;

    fn delete(&self, id: &NoteId) -> LocalBoxFuture<'static, StoreResult<()>>;

    /// Stream every note owned by `owner_id`, ordered by order key descending.
    fn subscribe(&self, owner_id: &str, sink: StreamSink) -> Subscription;
}

/// Live subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}
