//! The notes event loop.
//!
//! Every callback the page produces (DOM events, debounce timers, stream
//! deliveries, write completions) is turned into a [`NoteEvent`] and
//! handed to [`NotesSession::dispatch`]. Events are handled one at a time;
//! an event raised while another is being handled (a DOM `focusout` fired
//! by removing a focused card, say) is queued and handled right after.

use crate::caret::{self, CaretHost};
use crate::models::{ChangeBatch, NewNote, NoteId, NotePatch, OrderKey};
use crate::reconciler::Reconciler;
use crate::runtime::{Scheduler, Spawner};
use crate::session::{EditSession, Generation};
use crate::store::{NoteStore, StoreError, StreamSink, Subscription};
use crate::surface::{CardHandle, CardSurface, ContentRegion, ViewState};
use leptos::logging::{debug_warn, error, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

pub const STREAM_FAILED_MESSAGE: &str = "Failed to load notes";

#[derive(Clone, Debug, PartialEq)]
pub enum NoteEvent {
    Changes(ChangeBatch),
    StreamFailed(StoreError),
    /// The card's content changed locally (typing, text paste).
    Input { id: NoteId },
    Blur { id: NoteId },
    Focus { id: NoteId },
    DebounceElapsed { id: NoteId, generation: Generation },
    /// `visibilitychange` to hidden, `pagehide` or `beforeunload`.
    PageHidden,
    /// Write the card now (image pasted or removed).
    Commit { id: NoteId },
    CreateRequested,
    DeleteRequested { id: NoteId },
    /// Delete the first card in visual order.
    DeleteNewest,
    WriteSucceeded { id: NoteId },
    WriteFailed { id: NoteId, error: StoreError },
    CreateFailed { id: NoteId, error: StoreError },
    DeleteFailed { id: NoteId, error: StoreError },
}

pub struct SessionOptions {
    pub owner_id: String,
    pub autosave_ms: u32,
    /// Order key for a note created now.
    pub clock: Rc<dyn Fn() -> OrderKey>,
    /// Called (deferred) when the store rejects our credentials.
    pub on_unauthorized: Option<Rc<dyn Fn()>>,
}

struct Inner<S: CardSurface + 'static, Sc: Scheduler + 'static> {
    me: Weak<Shared<S, Sc>>,
    store: Rc<dyn NoteStore>,
    spawner: Rc<dyn Spawner>,
    reconciler: Reconciler<S>,
    edits: EditSession<Sc>,
    owner_id: String,
    clock: Rc<dyn Fn() -> OrderKey>,
    on_unauthorized: Option<Rc<dyn Fn()>>,
    subscription: Option<Subscription>,
}

struct Shared<S: CardSurface + 'static, Sc: Scheduler + 'static> {
    inner: RefCell<Inner<S, Sc>>,
    queue: RefCell<VecDeque<NoteEvent>>,
}

impl<S: CardSurface + 'static, Sc: Scheduler + 'static> Shared<S, Sc> {
    fn dispatch(&self, event: NoteEvent) {
        self.queue.borrow_mut().push_back(event);
        // Already handling an event further up the stack: it drains the queue.
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(event) => inner.handle(event),
                None => break,
            }
        }
    }
}

fn post<S: CardSurface + 'static, Sc: Scheduler + 'static>(
    me: &Weak<Shared<S, Sc>>,
    event: NoteEvent,
) {
    if let Some(shared) = me.upgrade() {
        shared.dispatch(event);
    }
}

/// One signed-in user's notes. Dropping the last handle unsubscribes from
/// the store; timers that fire afterwards are ignored.
pub struct NotesSession<S: CardSurface + 'static, Sc: Scheduler + 'static>(Rc<Shared<S, Sc>>);

impl<S: CardSurface + 'static, Sc: Scheduler + 'static> Clone for NotesSession<S, Sc> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: CardSurface + 'static, Sc: Scheduler + 'static> NotesSession<S, Sc> {
    pub fn start(
        store: Rc<dyn NoteStore>,
        surface: S,
        scheduler: Sc,
        spawner: Rc<dyn Spawner>,
        options: SessionOptions,
    ) -> Self {
        let SessionOptions {
            owner_id,
            autosave_ms,
            clock,
            on_unauthorized,
        } = options;

        let shared = Rc::new_cyclic(|me| Shared {
            inner: RefCell::new(Inner {
                me: me.clone(),
                store: store.clone(),
                spawner,
                reconciler: Reconciler::new(surface),
                edits: EditSession::new(scheduler, autosave_ms),
                owner_id: owner_id.clone(),
                clock,
                on_unauthorized,
                subscription: None,
            }),
            queue: RefCell::new(VecDeque::new()),
        });

        let me = Rc::downgrade(&shared);
        let sink: StreamSink = Box::new(move |result| {
            let event = match result {
                Ok(batch) => NoteEvent::Changes(batch),
                Err(e) => NoteEvent::StreamFailed(e),
            };
            post(&me, event);
        });
        let subscription = store.subscribe(&owner_id, sink);
        shared.inner.borrow_mut().subscription = Some(subscription);

        Self(shared)
    }

    pub fn dispatch(&self, event: NoteEvent) {
        self.0.dispatch(event);
    }

    /// Flush outstanding writes and stop listening to the store.
    pub fn shutdown(&self) {
        self.dispatch(NoteEvent::PageHidden);
        if let Ok(mut inner) = self.0.inner.try_borrow_mut() {
            inner.edits.cancel_all();
            inner.subscription = None;
        }
    }

    pub fn view_state(&self) -> ViewState {
        self.0.inner.borrow().reconciler.view_state().clone()
    }

    pub fn is_dirty(&self, id: &NoteId) -> bool {
        self.0.inner.borrow().edits.is_dirty(id)
    }
}

impl<S: CardSurface + 'static, Sc: Scheduler + 'static> Inner<S, Sc> {
    fn handle(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::Changes(batch) => {
                for id in self.reconciler.apply(batch) {
                    self.edits.cancel(&id);
                }
            }
            NoteEvent::StreamFailed(e) => {
                error!("note stream failed: {e}");
                self.check_unauthorized(&e);
                self.reconciler.fail(STREAM_FAILED_MESSAGE);
            }
            NoteEvent::Input { id } => self.on_input(id),
            NoteEvent::Blur { id } => self.on_blur(&id),
            NoteEvent::Focus { id } => self.on_focus(&id),
            NoteEvent::DebounceElapsed { id, generation } => {
                if self.edits.fire(&id, generation) {
                    self.write(&id);
                }
            }
            NoteEvent::PageHidden => {
                for id in self.edits.flush_all() {
                    self.write(&id);
                }
            }
            NoteEvent::Commit { id } => {
                self.edits.flush(&id);
                self.write(&id);
            }
            NoteEvent::CreateRequested => self.create(),
            NoteEvent::DeleteRequested { id } => self.delete(id),
            NoteEvent::DeleteNewest => {
                let first = self.reconciler.registry().first().map(|c| c.id.clone());
                if let Some(id) = first {
                    self.delete(id);
                }
            }
            NoteEvent::WriteSucceeded { id } => {
                self.edits.clear_dirty(&id);
                if let Some(card) = self.reconciler.registry().get(&id) {
                    card.handle.set_dirty(false);
                }
            }
            NoteEvent::WriteFailed { id, error } => {
                error!("saving note {id} failed: {error}");
                self.check_unauthorized(&error);
                if let Some(card) = self.reconciler.registry().get(&id) {
                    card.handle.set_dirty(true);
                    self.edits.mark_dirty(&id);
                }
            }
            NoteEvent::CreateFailed { id, error } => {
                error!("creating note {id} failed: {error}");
                self.check_unauthorized(&error);
                self.reconciler.drop_pending_creation(&id);
            }
            NoteEvent::DeleteFailed { id, error } => {
                error!("deleting note {id} failed: {error}");
                self.check_unauthorized(&error);
            }
        }
    }

    fn on_input(&mut self, id: NoteId) {
        let Some(card) = self.reconciler.registry().get(&id) else {
            debug_warn!("input on unknown note {id}");
            return;
        };
        let region = card.handle.region();
        let markup = region.markup();
        let snapshot = caret::capture(region);
        self.reconciler
            .registry_mut()
            .note_local_edit(&id, markup, snapshot);

        let me = self.me.clone();
        let task_id = id.clone();
        self.edits.on_input(&id, move |generation| -> Box<dyn FnOnce()> {
            Box::new(move || {
                post(
                    &me,
                    NoteEvent::DebounceElapsed {
                        id: task_id,
                        generation,
                    },
                )
            })
        });
    }

    fn on_blur(&mut self, id: &NoteId) {
        let Some(card) = self.reconciler.registry_mut().get_mut(id) else {
            // Card already removed: nothing left to save.
            self.edits.cancel(id);
            return;
        };
        if let Some(snapshot) = caret::capture(card.handle.region()) {
            card.caret = Some(snapshot);
        }
        if self.edits.flush(id) {
            self.write(id);
        }
    }

    /// Restore the cached caret unless the selection is already inside.
    fn on_focus(&mut self, id: &NoteId) {
        let Some(card) = self.reconciler.registry().get(id) else {
            return;
        };
        let region = card.handle.region();
        let Some(snapshot) = card.caret.as_ref() else {
            return;
        };
        if region.selection_in_region().is_none() && region.contains_anchor(&snapshot.anchor) {
            caret::restore(region, snapshot);
        }
    }

    /// Issue an update with the card's current markup.
    fn write(&mut self, id: &NoteId) {
        let Some(card) = self.reconciler.registry_mut().get_mut(id) else {
            self.edits.cancel(id);
            return;
        };
        let content = card.handle.region().markup();
        card.content = content.clone();

        let request = self.store.update(id, NotePatch::content(content));
        let me = self.me.clone();
        let id = id.clone();
        self.spawner.spawn(Box::pin(async move {
            let event = match request.await {
                Ok(()) => NoteEvent::WriteSucceeded { id },
                Err(error) => NoteEvent::WriteFailed { id, error },
            };
            post(&me, event);
        }));
    }

    fn create(&mut self) {
        let id = NoteId::generate();
        let note = NewNote {
            id: id.clone(),
            owner_id: self.owner_id.clone(),
            content: String::new(),
            order_key: (self.clock)(),
        };
        self.reconciler.mark_pending_creation(id.clone());

        let request = self.store.create(note);
        let me = self.me.clone();
        self.spawner.spawn(Box::pin(async move {
            match request.await {
                Ok(assigned) if assigned != id => {
                    warn!("note created as {id} was stored as {assigned}");
                }
                Ok(_) => {}
                Err(error) => post(&me, NoteEvent::CreateFailed { id, error }),
            }
        }));
    }

    fn delete(&mut self, id: NoteId) {
        self.edits.cancel(&id);
        let request = self.store.delete(&id);
        let me = self.me.clone();
        self.spawner.spawn(Box::pin(async move {
            if let Err(error) = request.await {
                post(&me, NoteEvent::DeleteFailed { id, error });
            }
        }));
    }

    fn check_unauthorized(&self, error: &StoreError) {
        if *error != StoreError::Unauthorized {
            return;
        }
        if let Some(cb) = self.on_unauthorized.clone() {
            self.spawner.spawn(Box::pin(async move { cb() }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeRecord;
    use crate::runtime::manual::{ManualScheduler, PoolDriver};
    use crate::store::memory::{MemoryStore, StoreCall};
    use crate::surface::memory::MemSurface;
    use std::cell::Cell;

    struct Harness {
        store: MemoryStore,
        surface: MemSurface,
        clock: ManualScheduler,
        pool: PoolDriver,
        session: NotesSession<MemSurface, ManualScheduler>,
        signed_out: Rc<Cell<bool>>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let surface = MemSurface::new();
        let clock = ManualScheduler::default();
        let pool = PoolDriver::new();
        let signed_out = Rc::new(Cell::new(false));

        let next_key = Rc::new(Cell::new(1_000));
        let flag = signed_out.clone();
        let session = NotesSession::start(
            Rc::new(store.clone()),
            surface.clone(),
            clock.clone(),
            Rc::new(pool.clone()),
            SessionOptions {
                owner_id: "u1".to_string(),
                autosave_ms: 1500,
                clock: Rc::new(move || {
                    next_key.set(next_key.get() + 1);
                    next_key.get()
                }),
                on_unauthorized: Some(Rc::new(move || flag.set(true))),
            },
        );

        Harness {
            store,
            surface,
            clock,
            pool,
            session,
            signed_out,
        }
    }

    fn added(id: &str, key: OrderKey, content: &str) -> ChangeRecord {
        ChangeRecord::Added {
            id: id.into(),
            content: content.to_string(),
            order_key: key,
        }
    }

    impl Harness {
        fn seed(&self, notes: &[(&str, OrderKey, &str)]) {
            let records = notes.iter().map(|(id, k, c)| added(id, *k, c)).collect();
            self.store.deliver(ChangeBatch::new(records, false));
        }

        fn type_into(&self, id: &str, text: &str) {
            let card = self.surface.card(id).expect("card rendered");
            card.region().type_text(text, text.chars().count() as u32);
            self.session.dispatch(NoteEvent::Input { id: id.into() });
        }

        fn settle(&self) {
            self.pool.run();
        }
    }

    #[test]
    fn test_flush_on_blur_writes_once() {
        let h = harness();
        h.seed(&[("x", 1, "")]);
        h.type_into("x", "draft");
        h.clock.advance(500);

        h.session.dispatch(NoteEvent::Blur { id: "x".into() });
        h.settle();
        assert_eq!(h.store.updates(), vec![(NoteId::from("x"), "draft".to_string())]);

        h.clock.advance(10_000);
        h.settle();
        assert_eq!(h.store.updates().len(), 1);
        assert_eq!(h.clock.pending_count(), 0);
    }

    #[test]
    fn test_debounce_coalesces_to_latest_content() {
        let h = harness();
        h.seed(&[("x", 1, "")]);
        h.type_into("x", "a");
        h.clock.advance(500);
        h.type_into("x", "ab");
        h.clock.advance(500);
        h.type_into("x", "abc");

        h.clock.advance(1499);
        h.settle();
        assert!(h.store.updates().is_empty());

        h.clock.advance(1);
        h.settle();
        assert_eq!(h.store.updates(), vec![(NoteId::from("x"), "abc".to_string())]);
    }

    #[test]
    fn test_timers_are_independent_per_note() {
        let h = harness();
        h.seed(&[("a", 2, ""), ("b", 1, "")]);
        h.type_into("a", "aa");
        h.type_into("b", "bb");

        h.session.dispatch(NoteEvent::Blur { id: "a".into() });
        h.settle();
        assert_eq!(h.store.updates(), vec![(NoteId::from("a"), "aa".to_string())]);

        h.clock.advance(1500);
        h.settle();
        assert_eq!(
            h.store.updates(),
            vec![(NoteId::from("a"), "aa".to_string()), (NoteId::from("b"), "bb".to_string())]
        );
    }

    #[test]
    fn test_blur_without_edits_does_not_write() {
        let h = harness();
        h.seed(&[("a", 1, "text")]);
        h.session.dispatch(NoteEvent::Blur { id: "a".into() });
        h.settle();
        assert!(h.store.calls().is_empty());
    }

    #[test]
    fn test_page_hidden_flushes_everything() {
        let h = harness();
        h.seed(&[("a", 2, ""), ("b", 1, "")]);
        h.type_into("a", "1");
        h.type_into("b", "2");

        h.session.dispatch(NoteEvent::PageHidden);
        h.settle();
        assert_eq!(h.store.updates().len(), 2);
        assert_eq!(h.clock.pending_count(), 0);
    }

    #[test]
    fn test_failed_write_marks_dirty_and_retries_on_blur() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        h.store.fail_next(StoreError::Network("offline".to_string()));
        h.type_into("a", "keep me");
        h.clock.advance(1500);
        h.settle();

        let card = h.surface.card("a").expect("card");
        assert!(card.is_dirty());
        assert!(h.session.is_dirty(&"a".into()));

        h.session.dispatch(NoteEvent::Blur { id: "a".into() });
        h.settle();
        assert_eq!(h.store.updates().len(), 2);
        assert!(!card.is_dirty());
        assert!(!h.session.is_dirty(&"a".into()));
    }

    #[test]
    fn test_echo_of_local_edit_does_not_rerender() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        h.type_into("a", "typed");
        h.store.deliver(ChangeBatch::new(
            vec![ChangeRecord::Modified {
                id: "a".into(),
                content: "typed".to_string(),
                order_key: 1,
            }],
            true,
        ));
        let card = h.surface.card("a").expect("card");
        assert_eq!(card.region().writes(), 0);
        assert_eq!(h.surface.focused_id().as_deref(), Some("a"));
    }

    #[test]
    fn test_create_focuses_new_card_once_acknowledged() {
        let h = harness();
        h.seed(&[("old", 5, "x")]);
        h.session.dispatch(NoteEvent::CreateRequested);
        h.settle();

        let created = match h.store.calls().as_slice() {
            [StoreCall::Create(note)] => note.clone(),
            other => panic!("expected one create, got {other:?}"),
        };
        assert_eq!(created.owner_id, "u1");
        assert_eq!(created.content, "");
        assert!(created.order_key > 5);

        let id = created.id.to_string();
        h.store.deliver(ChangeBatch::new(
            vec![added(&id, created.order_key, "")],
            true,
        ));
        assert_eq!(h.surface.ids(), vec![id.clone(), "old".to_string()]);
        assert_eq!(h.surface.focused_id(), Some(id.clone()));

        h.store.deliver(ChangeBatch::new(vec![], false));
        assert_eq!(h.surface.focused_id(), Some(id));
    }

    #[test]
    fn test_failed_create_drops_marker() {
        let h = harness();
        h.store.fail_next(StoreError::Rejected("quota".to_string()));
        h.session.dispatch(NoteEvent::CreateRequested);
        h.settle();

        let id = match h.store.calls().as_slice() {
            [StoreCall::Create(note)] => note.id.clone(),
            other => panic!("expected one create, got {other:?}"),
        };
        // A late echo of the failed note must not grab focus.
        h.store
            .deliver(ChangeBatch::new(vec![added(id.as_str(), 9, "")], false));
        assert_eq!(h.surface.focused_id(), None);
    }

    #[test]
    fn test_delete_cancels_pending_write() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        h.type_into("a", "soon gone");
        h.session.dispatch(NoteEvent::DeleteRequested { id: "a".into() });
        h.clock.advance(5000);
        h.settle();
        assert_eq!(h.store.calls(), vec![StoreCall::Delete("a".into())]);

        h.store.deliver(ChangeBatch::new(
            vec![ChangeRecord::Removed { id: "a".into() }],
            false,
        ));
        assert!(h.surface.cards().is_empty());
        assert_eq!(h.session.view_state(), ViewState::Empty);
    }

    #[test]
    fn test_remote_removal_cancels_timer_and_blur_is_ignored() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        h.type_into("a", "edit");
        h.store.deliver(ChangeBatch::new(
            vec![ChangeRecord::Removed { id: "a".into() }],
            false,
        ));
        h.session.dispatch(NoteEvent::Blur { id: "a".into() });
        h.clock.advance(5000);
        h.settle();
        assert!(h.store.calls().is_empty());
    }

    #[test]
    fn test_delete_newest_targets_first_card() {
        let h = harness();
        h.seed(&[("old", 1, ""), ("new", 2, "")]);
        h.session.dispatch(NoteEvent::DeleteNewest);
        h.settle();
        assert_eq!(h.store.calls(), vec![StoreCall::Delete("new".into())]);
    }

    #[test]
    fn test_commit_writes_immediately() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        let card = h.surface.card("a").expect("card");
        card.region().type_text("<figure class=\"note-media\"></figure><br>", 0);
        h.session.dispatch(NoteEvent::Commit { id: "a".into() });
        h.settle();
        assert_eq!(h.store.updates().len(), 1);
        assert_eq!(h.clock.pending_count(), 0);
    }

    #[test]
    fn test_focus_restores_cached_caret() {
        let h = harness();
        h.seed(&[("a", 2, ""), ("b", 1, "other")]);
        h.type_into("a", "hello");
        let a = h.surface.card("a").expect("a");
        a.region().place_caret(2);
        h.session.dispatch(NoteEvent::Blur { id: "a".into() });

        h.surface.card("b").expect("b").region().place_caret(1);
        a.region().focus();
        h.session.dispatch(NoteEvent::Focus { id: "a".into() });
        assert_eq!(caret::capture(a.region()).map(|s| s.text_offset), Some(2));
    }

    #[test]
    fn test_stream_failure_shows_error_and_signs_out() {
        let h = harness();
        h.store.fail_stream(StoreError::Unauthorized);
        h.settle();
        assert_eq!(
            h.session.view_state(),
            ViewState::Failed(STREAM_FAILED_MESSAGE.to_string())
        );
        assert!(h.signed_out.get());
    }

    #[test]
    fn test_dropping_session_unsubscribes_and_ignores_timers() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        h.type_into("a", "late");
        assert_eq!(h.store.subscriber_count(), 1);

        let Harness {
            store,
            clock,
            pool,
            session,
            ..
        } = h;
        drop(session);
        assert_eq!(store.subscriber_count(), 0);

        clock.advance(5000);
        pool.run();
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_shutdown_flushes_pending_writes() {
        let h = harness();
        h.seed(&[("a", 1, "")]);
        h.type_into("a", "bye");
        h.session.shutdown();
        h.settle();
        assert_eq!(h.store.updates(), vec![(NoteId::from("a"), "bye".to_string())]);
        assert_eq!(h.store.subscriber_count(), 0);
    }
}
