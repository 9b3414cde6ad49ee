//! Recording store for native tests.
//!
//! Writes are recorded and resolve immediately (or with a queued error);
//! batches only reach subscribers through [`MemoryStore::deliver`].

use super::{NoteStore, StoreError, StoreResult, StreamSink, Subscription};
use crate::models::{ChangeBatch, NewNote, NoteId, NotePatch};
use futures::future::{self, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoreCall {
    Create(NewNote),
    Update(NoteId, NotePatch),
    Delete(NoteId),
}

#[derive(Default)]
struct State {
    calls: Vec<StoreCall>,
    failures: VecDeque<StoreError>,
    sinks: Vec<(u64, String, StreamSink)>,
    cancelled: HashSet<u64>,
    next_sub: u64,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Rc<RefCell<State>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<StoreCall> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn updates(&self) -> Vec<(NoteId, String)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Update(id, patch) => {
                    Some((id.clone(), patch.content.clone().unwrap_or_default()))
                }
                _ => None,
            })
            .collect()
    }

    /// The next write fails with `err`.
    pub(crate) fn fail_next(&self, err: StoreError) {
        self.state.borrow_mut().failures.push_back(err);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        let state = self.state.borrow();
        state
            .sinks
            .iter()
            .filter(|(id, _, _)| !state.cancelled.contains(id))
            .count()
    }

    pub(crate) fn deliver(&self, batch: ChangeBatch) {
        self.emit(|| Ok(batch.clone()));
    }

    pub(crate) fn fail_stream(&self, err: StoreError) {
        self.emit(|| Err(err.clone()));
    }

    /// Sinks are taken out while called so they may write back into the store.
    fn emit(&self, make: impl Fn() -> StoreResult<ChangeBatch>) {
        let mut sinks = std::mem::take(&mut self.state.borrow_mut().sinks);
        for (id, _, sink) in sinks.iter_mut() {
            if !self.state.borrow().cancelled.contains(id) {
                sink(make());
            }
        }
        let mut state = self.state.borrow_mut();
        sinks.append(&mut state.sinks);
        let cancelled = std::mem::take(&mut state.cancelled);
        sinks.retain(|(id, _, _)| !cancelled.contains(id));
        state.sinks = sinks;
    }

    fn record(&self, call: StoreCall) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl NoteStore for MemoryStore {
    fn create(&self, note: NewNote) -> LocalBoxFuture<'static, StoreResult<NoteId>> {
        let id = note.id.clone();
        let result = self.record(StoreCall::Create(note)).map(|_| id);
        Box::pin(future::ready(result))
    }

    fn update(&self, id: &NoteId, patch: NotePatch) -> LocalBoxFuture<'static, StoreResult<()>> {
        let result = self.record(StoreCall::Update(id.clone(), patch));
        Box::pin(future::ready(result))
    }

    fn delete(&self, id: &NoteId) -> LocalBoxFuture<'static, StoreResult<()>> {
        let result = self.record(StoreCall::Delete(id.clone()));
        Box::pin(future::ready(result))
    }

    fn subscribe(&self, owner_id: &str, sink: StreamSink) -> Subscription {
        let sub_id = {
            let mut state = self.state.borrow_mut();
            state.next_sub += 1;
            let sub_id = state.next_sub;
            state.sinks.push((sub_id, owner_id.to_string(), sink));
            sub_id
        };
        let state = Rc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.borrow_mut();
                let before = state.sinks.len();
                state.sinks.retain(|(id, _, _)| *id != sub_id);
                if state.sinks.len() == before {
                    // Currently delivering; dropped when the sinks are put back.
                    state.cancelled.insert(sub_id);
                }
            }
        })
    }
}
