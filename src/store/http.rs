//! REST-backed store with a polled change stream.
//!
//! The backend has no push channel, so a subscription polls the owner's
//! note list and diffs it against the last snapshot. Local writes are
//! echoed to subscribers right away with `has_pending_writes` set; while
//! writes are in flight polling is suspended, and one poll runs as soon as
//! the last write settles. That poll clears the pending flag even when the
//! diff is empty.
//!
//! Only the initial load can fail visibly; later poll errors are logged
//! and retried by the next tick.

use super::{NoteStore, StoreError, StoreResult, StreamSink, Subscription};
use crate::api::ApiClient;
use crate::models::{ChangeBatch, ChangeRecord, NewNote, Note, NoteId, NotePatch};
use crate::runtime::{IntervalHandle, Spawner};
use futures::future::LocalBoxFuture;
use leptos::logging::{debug_warn, warn};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

/// Changes that turn `known` into `server`.
///
/// Adds and modifications follow the server's order; removals come last,
/// sorted by id. Ids in `unconfirmed` keep their local content.
pub(crate) fn diff_snapshot(
    known: &HashMap<NoteId, Note>,
    server: &[Note],
    unconfirmed: &HashSet<NoteId>,
) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    let mut seen = HashSet::with_capacity(server.len());

    for note in server {
        if !seen.insert(&note.id) {
            continue;
        }
        match known.get(&note.id) {
            None => records.push(ChangeRecord::Added {
                id: note.id.clone(),
                content: note.content.clone(),
                order_key: note.order_key,
            }),
            Some(prev) if unconfirmed.contains(&note.id) => {
                if prev.order_key != note.order_key {
                    records.push(ChangeRecord::Modified {
                        id: note.id.clone(),
                        content: prev.content.clone(),
                        order_key: note.order_key,
                    });
                }
            }
            Some(prev) if prev.content != note.content || prev.order_key != note.order_key => {
                records.push(ChangeRecord::Modified {
                    id: note.id.clone(),
                    content: note.content.clone(),
                    order_key: note.order_key,
                })
            }
            Some(_) => {}
        }
    }

    let mut gone: Vec<&NoteId> = known.keys().filter(|id| !seen.contains(id)).collect();
    gone.sort();
    records.extend(gone.into_iter().map(|id| ChangeRecord::Removed { id: id.clone() }));
    records
}

/// Apply `records` to `known` the way a subscriber would.
fn absorb(known: &mut HashMap<NoteId, Note>, owner_id: &str, records: &[ChangeRecord]) {
    for record in records {
        match record {
            ChangeRecord::Added {
                id,
                content,
                order_key,
            }
            | ChangeRecord::Modified {
                id,
                content,
                order_key,
            } => {
                known.insert(
                    id.clone(),
                    Note {
                        id: id.clone(),
                        content: content.clone(),
                        order_key: *order_key,
                        owner_id: owner_id.to_string(),
                    },
                );
            }
            ChangeRecord::Removed { id } => {
                known.remove(id);
            }
        }
    }
}

/// A local write, as seen before the server confirms it.
enum Echo {
    Create(NewNote),
    Update(NoteId, String),
    Delete(NoteId),
}

impl Echo {
    fn records(&self, feed: &Feed) -> Vec<ChangeRecord> {
        match self {
            Echo::Create(note) => {
                if note.owner_id != feed.owner_id || feed.known.contains_key(&note.id) {
                    return Vec::new();
                }
                vec![ChangeRecord::Added {
                    id: note.id.clone(),
                    content: note.content.clone(),
                    order_key: note.order_key,
                }]
            }
            Echo::Update(id, content) => match feed.known.get(id) {
                Some(prev) if &prev.content != content => vec![ChangeRecord::Modified {
                    id: id.clone(),
                    content: content.clone(),
                    order_key: prev.order_key,
                }],
                _ => Vec::new(),
            },
            Echo::Delete(id) if feed.known.contains_key(id) => {
                vec![ChangeRecord::Removed { id: id.clone() }]
            }
            Echo::Delete(_) => Vec::new(),
        }
    }
}

struct Feed {
    owner_id: String,
    known: HashMap<NoteId, Note>,
    sink: Option<StreamSink>,
    closed: bool,
    /// The next settled poll must emit, even for an empty diff: the last
    /// batch had `has_pending_writes` set, or the last poll failed.
    reported_pending: bool,
    /// A poll has succeeded since subscribing.
    loaded: bool,
    polling: bool,
}

impl Feed {
    fn emit(feed: &Rc<RefCell<Feed>>, result: StoreResult<ChangeBatch>) {
        // Take the sink out so it may call back into the store.
        let Some(mut sink) = feed.borrow_mut().sink.take() else {
            return;
        };
        sink(result);
        let mut feed = feed.borrow_mut();
        if !feed.closed {
            feed.sink = Some(sink);
        }
    }

    /// Turn a finished poll into a delivery.
    ///
    /// Once the list has loaded, a failed poll is only logged; the next
    /// successful one emits so a failed view recovers. Unauthorized is
    /// always delivered.
    fn settle(
        feed: &Rc<RefCell<Feed>>,
        owner_id: &str,
        result: StoreResult<Vec<Note>>,
        unconfirmed: &HashSet<NoteId>,
    ) {
        match result {
            Ok(server) => {
                let server: Vec<Note> = server
                    .into_iter()
                    .filter(|n| n.owner_id.is_empty() || n.owner_id == owner_id)
                    .collect();
                let batch = {
                    let mut f = feed.borrow_mut();
                    f.loaded = true;
                    let records = diff_snapshot(&f.known, &server, unconfirmed);
                    if records.is_empty() && !f.reported_pending {
                        None
                    } else {
                        absorb(&mut f.known, owner_id, &records);
                        f.reported_pending = false;
                        Some(ChangeBatch::new(records, false))
                    }
                };
                if let Some(batch) = batch {
                    Feed::emit(feed, Ok(batch));
                }
            }
            Err(e) => {
                let deliver = {
                    let mut f = feed.borrow_mut();
                    f.reported_pending = true;
                    !f.loaded || e == StoreError::Unauthorized
                };
                warn!("note list poll failed: {e}");
                if deliver {
                    Feed::emit(feed, Err(e));
                }
            }
        }
    }
}

#[derive(Default)]
struct WriteState {
    in_flight: usize,
    /// Bumped whenever a write starts; a poll that began before is stale.
    epoch: u64,
    /// Ids whose last write failed. Polls keep their local content.
    unconfirmed: HashSet<NoteId>,
    feeds: Vec<Weak<RefCell<Feed>>>,
}

impl WriteState {
    fn live_feeds(&mut self) -> Vec<Rc<RefCell<Feed>>> {
        self.feeds.retain(|f| f.strong_count() > 0);
        self.feeds.iter().filter_map(Weak::upgrade).collect()
    }
}

#[derive(Clone)]
pub struct HttpNoteStore {
    api: ApiClient,
    spawner: Rc<dyn Spawner>,
    poll_ms: u32,
    writes: Rc<RefCell<WriteState>>,
}

impl HttpNoteStore {
    pub fn new(api: ApiClient, spawner: Rc<dyn Spawner>, poll_ms: u32) -> Self {
        Self {
            api,
            spawner,
            poll_ms,
            writes: Rc::default(),
        }
    }

    /// Echo a local write to every subscriber and count it as in flight.
    fn begin_write(writes: &Rc<RefCell<WriteState>>, echo: &Echo) {
        let feeds = {
            let mut w = writes.borrow_mut();
            w.in_flight += 1;
            w.epoch += 1;
            w.live_feeds()
        };
        for feed in feeds {
            let records = {
                let mut f = feed.borrow_mut();
                let records = echo.records(&f);
                let owner = f.owner_id.clone();
                absorb(&mut f.known, &owner, &records);
                if !records.is_empty() {
                    f.reported_pending = true;
                }
                records
            };
            if !records.is_empty() {
                Feed::emit(&feed, Ok(ChangeBatch::new(records, true)));
            }
        }
    }

    /// Settle a write; the last one to settle triggers a confirming poll.
    fn end_write(
        writes: &Rc<RefCell<WriteState>>,
        api: &ApiClient,
        spawner: &Rc<dyn Spawner>,
        id: &NoteId,
        ok: bool,
    ) {
        let feeds = {
            let mut w = writes.borrow_mut();
            w.in_flight = w.in_flight.saturating_sub(1);
            if ok {
                w.unconfirmed.remove(id);
            } else {
                w.unconfirmed.insert(id.clone());
            }
            if w.in_flight > 0 {
                return;
            }
            w.live_feeds()
        };
        for feed in feeds {
            Self::spawn_poll(writes, api, spawner, &feed);
        }
    }

    fn spawn_poll(
        writes: &Rc<RefCell<WriteState>>,
        api: &ApiClient,
        spawner: &Rc<dyn Spawner>,
        feed: &Rc<RefCell<Feed>>,
    ) {
        let owner_id = {
            let mut f = feed.borrow_mut();
            if f.polling {
                return;
            }
            f.polling = true;
            f.owner_id.clone()
        };

        let writes = writes.clone();
        let api = api.clone();
        let feed = Rc::downgrade(feed);
        spawner.spawn(Box::pin(async move {
            let epoch = writes.borrow().epoch;
            let result = api.list_notes(&owner_id).await;
            let Some(feed) = feed.upgrade() else {
                return;
            };
            feed.borrow_mut().polling = false;

            let (stale, unconfirmed) = {
                let w = writes.borrow();
                (w.in_flight > 0 || w.epoch != epoch, w.unconfirmed.clone())
            };
            if stale {
                debug_warn!("discarding note list fetched during a write");
                return;
            }

            Feed::settle(&feed, &owner_id, result, &unconfirmed);
        }));
    }

    fn write<T: 'static>(
        &self,
        echo: Echo,
        id: NoteId,
        request: LocalBoxFuture<'static, StoreResult<T>>,
    ) -> LocalBoxFuture<'static, StoreResult<T>> {
        let writes = self.writes.clone();
        let api = self.api.clone();
        let spawner = self.spawner.clone();
        Box::pin(async move {
            Self::begin_write(&writes, &echo);
            let result = request.await;
            Self::end_write(&writes, &api, &spawner, &id, result.is_ok());
            result
        })
    }
}

impl NoteStore for HttpNoteStore {
    fn create(&self, note: NewNote) -> LocalBoxFuture<'static, StoreResult<NoteId>> {
        let api = self.api.clone();
        let id = note.id.clone();
        let body = note.clone();
        self.write(
            Echo::Create(note),
            id,
            Box::pin(async move { api.create_note(&body).await }),
        )
    }

    fn update(&self, id: &NoteId, patch: NotePatch) -> LocalBoxFuture<'static, StoreResult<()>> {
        let Some(content) = patch.content else {
            return Box::pin(async { Ok(()) });
        };
        let api = self.api.clone();
        let target = id.clone();
        let body = content.clone();
        self.write(
            Echo::Update(id.clone(), content),
            id.clone(),
            Box::pin(async move { api.update_note(&target, &body).await }),
        )
    }

    fn delete(&self, id: &NoteId) -> LocalBoxFuture<'static, StoreResult<()>> {
        let api = self.api.clone();
        let target = id.clone();
        self.write(
            Echo::Delete(id.clone()),
            id.clone(),
            Box::pin(async move { api.delete_note(&target).await }),
        )
    }

    fn subscribe(&self, owner_id: &str, sink: StreamSink) -> Subscription {
        let feed = Rc::new(RefCell::new(Feed {
            owner_id: owner_id.to_string(),
            known: HashMap::new(),
            sink: Some(sink),
            closed: false,
            // The first poll always emits, even for an empty list.
            reported_pending: true,
            loaded: false,
            polling: false,
        }));
        self.writes.borrow_mut().feeds.push(Rc::downgrade(&feed));

        Self::spawn_poll(&self.writes, &self.api, &self.spawner, &feed);

        let interval = {
            let writes = self.writes.clone();
            let api = self.api.clone();
            let spawner = self.spawner.clone();
            let weak = Rc::downgrade(&feed);
            IntervalHandle::start(self.poll_ms, move || {
                let Some(feed) = weak.upgrade() else {
                    return;
                };
                if writes.borrow().in_flight > 0 {
                    return;
                }
                Self::spawn_poll(&writes, &api, &spawner, &feed);
            })
        };
        if interval.is_none() {
            warn!("could not start note polling; changes from other sessions won't appear");
        }

        Subscription::new(move || {
            drop(interval);
            let mut feed = feed.borrow_mut();
            feed.closed = true;
            feed.sink = None;
        })
    }
}
