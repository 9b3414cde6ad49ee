//! Applies change batches to the card list.
//!
//! Work per batch is proportional to the records in it: every record
//! touches at most the one card it names, and inserting scans the
//! registry once for the first card that sorts after the newcomer.
//! The list is never rebuilt.
//!
//! Focus policy per batch:
//! 1. Before applying, remember which card had focus and its caret.
//! 2. If a locally created note (pending-creation marker) now has a card,
//!    the newest such card gets focus with the caret at the end. Markers
//!    are cleared once a batch without pending writes shows the card.
//! 3. Otherwise the previously focused card, if still present, gets its
//!    focus and caret back. Focus is never moved to any other card.

use crate::caret::{self, CaretHost};
use crate::models::{ChangeBatch, ChangeRecord, NoteId, OrderKey};
use crate::registry::{Card, CardRegistry};
use crate::surface::{CardHandle, CardSurface, CaretOf, ContentRegion, ViewState};
use leptos::logging::debug_warn;

pub struct Reconciler<S: CardSurface> {
    surface: S,
    registry: CardRegistry<S::Card>,
    /// Locally created ids awaiting acknowledgment, oldest first.
    pending: Vec<NoteId>,
    view: ViewState,
}

impl<S: CardSurface> Reconciler<S> {
    pub fn new(surface: S) -> Self {
        surface.set_view_state(&ViewState::Loading);
        Self {
            surface,
            registry: CardRegistry::new(),
            pending: Vec::new(),
            view: ViewState::Loading,
        }
    }

    pub fn registry(&self) -> &CardRegistry<S::Card> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CardRegistry<S::Card> {
        &mut self.registry
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn pending_creations(&self) -> &[NoteId] {
        &self.pending
    }

    /// Remember a note created locally so its card is focused on arrival.
    pub fn mark_pending_creation(&mut self, id: NoteId) {
        self.pending.retain(|p| p != &id);
        self.pending.push(id);
    }

    /// Forget a marker, e.g. after the create request failed.
    pub fn drop_pending_creation(&mut self, id: &NoteId) {
        self.pending.retain(|p| p != id);
    }

    pub fn focused_id(&self) -> Option<NoteId> {
        self.registry
            .iter()
            .find(|c| c.handle.region().has_focus())
            .map(|c| c.id.clone())
    }

    /// Apply one batch. Returns the ids whose cards were removed.
    pub fn apply(&mut self, batch: ChangeBatch) -> Vec<NoteId> {
        let prev_focus = self.focused_id();
        let mut prev_caret = prev_focus
            .as_ref()
            .and_then(|id| self.registry.get(id))
            .and_then(|c| caret::capture(c.handle.region()));

        let mut removed = Vec::new();
        for record in batch.records {
            match record {
                ChangeRecord::Added {
                    id,
                    content,
                    order_key,
                } => self.add(id, content, order_key),
                ChangeRecord::Modified {
                    id,
                    content,
                    order_key,
                } => {
                    let focused = prev_focus.as_ref() == Some(&id);
                    if self.modify(&id, content, order_key) && focused {
                        // Old anchor is gone; keep whatever restore settled on.
                        prev_caret = self
                            .registry
                            .get(&id)
                            .and_then(|c| caret::capture(c.handle.region()));
                    }
                }
                ChangeRecord::Removed { id } => {
                    if self.remove(&id) {
                        removed.push(id);
                    }
                }
            }
        }

        if !self.focus_pending(batch.has_pending_writes) {
            if let Some(id) = prev_focus {
                self.refocus(&id, prev_caret.as_ref());
            }
        }

        self.set_view(if self.registry.is_empty() {
            ViewState::Empty
        } else {
            ViewState::Notes
        });
        removed
    }

    /// The change stream failed. The list is replaced by an error state.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.set_view(ViewState::Failed(message.into()));
    }

    fn set_view(&mut self, view: ViewState) {
        if self.view != view {
            self.surface.set_view_state(&view);
            self.view = view;
        }
    }

    fn add(&mut self, id: NoteId, content: String, order_key: OrderKey) {
        if self.registry.contains(&id) {
            debug_warn!("note {id} already rendered, ignoring duplicate add");
            return;
        }
        let Some(handle) = self.surface.create_card(&id, &content) else {
            debug_warn!("could not create a card for note {id}");
            return;
        };
        let idx = self
            .registry
            .insert(Card::new(id, handle, order_key, content));
        self.seat(idx);
    }

    /// Returns true when the card's content was replaced.
    fn modify(&mut self, id: &NoteId, content: String, order_key: OrderKey) -> bool {
        let Some(card) = self.registry.get(id) else {
            debug_warn!("modify for unknown note {id}, ignoring");
            return false;
        };

        if card.order_key != order_key {
            if let Some(mut card) = self.registry.remove(id) {
                card.order_key = order_key;
                let idx = self.registry.insert(card);
                self.seat(idx);
            }
        }

        let Some(card) = self.registry.get_mut(id) else {
            return false;
        };
        if card.content == content {
            return false;
        }

        let region = card.handle.region();
        let snapshot = if region.has_focus() {
            caret::capture(region)
        } else {
            None
        };
        region.set_markup(&content);
        if let Some(snapshot) = snapshot {
            caret::restore(region, &snapshot);
        }
        card.content = content;
        card.caret = None;
        true
    }

    fn remove(&mut self, id: &NoteId) -> bool {
        let Some(card) = self.registry.remove(id) else {
            debug_warn!("remove for unknown note {id}, ignoring");
            return false;
        };
        let had_focus = card.handle.region().has_focus();
        self.surface.remove(&card.handle);
        if had_focus {
            self.surface.clear_focus();
        }
        true
    }

    /// Put the card at `idx` in front of its successor on the surface.
    fn seat(&self, idx: usize) {
        let Some(card) = self.registry.at(idx) else {
            return;
        };
        let next = self.registry.at(idx + 1).map(|c| &c.handle);
        self.surface.insert_before(&card.handle, next);
    }

    /// Focus the newest pending creation that has a card.
    ///
    /// Returns false when no marker applies.
    fn focus_pending(&mut self, has_pending_writes: bool) -> bool {
        let Some(idx) = self
            .pending
            .iter()
            .rposition(|id| self.registry.contains(id))
        else {
            return false;
        };

        if let Some(card) = self.registry.get(&self.pending[idx]) {
            let region = card.handle.region();
            if !region.has_focus() {
                region.focus();
                region.collapse_to_end();
            }
        }

        if !has_pending_writes {
            self.pending = self.pending.split_off(idx + 1);
        }
        true
    }

    fn refocus(&self, id: &NoteId, snapshot: Option<&CaretOf<S::Card>>) {
        let Some(card) = self.registry.get(id) else {
            return;
        };
        let region = card.handle.region();
        if region.has_focus() {
            return;
        }
        region.focus();
        match snapshot {
            Some(snapshot) => {
                caret::restore(region, snapshot);
            }
            None => region.collapse_to_end(),
        }
    }
}
