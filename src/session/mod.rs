//! Debounced write bookkeeping, one trailing-edge timer per note.
//!
//! The session only decides *when* a note must be written; reading the
//! content and issuing the request is up to the caller.

use crate::models::NoteId;
use crate::runtime::{Scheduler, TimerHandle};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    Scheduled,
}

/// Identifies one scheduled timer so a late callback from a replaced timer
/// can be told apart from the live one.
pub type Generation = u64;

pub struct EditSession<Sc: Scheduler> {
    scheduler: Sc,
    delay_ms: u32,
    timers: HashMap<NoteId, (TimerHandle, Generation)>,
    /// Notes whose last write failed; written again at the next flush.
    dirty: HashSet<NoteId>,
    next_generation: Generation,
}

impl<Sc: Scheduler> EditSession<Sc> {
    pub fn new(scheduler: Sc, delay_ms: u32) -> Self {
        Self {
            scheduler,
            delay_ms,
            timers: HashMap::new(),
            dirty: HashSet::new(),
            next_generation: 0,
        }
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn state(&self, id: &NoteId) -> WriteState {
        if self.timers.contains_key(id) {
            WriteState::Scheduled
        } else {
            WriteState::Idle
        }
    }

    /// Local input on `id`: (re)start its timer.
    ///
    /// `make_task` builds the timer callback from the new generation; the
    /// callback should end up in [`EditSession::fire`].
    pub fn on_input(
        &mut self,
        id: &NoteId,
        make_task: impl FnOnce(Generation) -> Box<dyn FnOnce()>,
    ) -> Generation {
        if let Some((handle, _)) = self.timers.remove(id) {
            self.scheduler.cancel(handle);
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = self.scheduler.schedule(self.delay_ms, make_task(generation));
        self.timers.insert(id.clone(), (handle, generation));
        generation
    }

    /// Timer elapsed. True when the caller should write now.
    pub fn fire(&mut self, id: &NoteId, generation: Generation) -> bool {
        match self.timers.get(id) {
            Some((_, live)) if *live == generation => {
                self.timers.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Blur / explicit commit: cancel the timer and write immediately if
    /// anything is outstanding.
    pub fn flush(&mut self, id: &NoteId) -> bool {
        let scheduled = match self.timers.remove(id) {
            Some((handle, _)) => {
                self.scheduler.cancel(handle);
                true
            }
            None => false,
        };
        scheduled || self.dirty.contains(id)
    }

    /// Page hide: every note with a scheduled or failed write.
    pub fn flush_all(&mut self) -> Vec<NoteId> {
        let mut ids: Vec<NoteId> = self
            .timers
            .drain()
            .map(|(id, (handle, _))| {
                self.scheduler.cancel(handle);
                id
            })
            .collect();
        for id in &self.dirty {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids.sort();
        ids
    }

    /// Forget `id` entirely; its timer never fires.
    pub fn cancel(&mut self, id: &NoteId) {
        if let Some((handle, _)) = self.timers.remove(id) {
            self.scheduler.cancel(handle);
        }
        self.dirty.remove(id);
    }

    /// Cancel every timer, e.g. on sign-out.
    pub fn cancel_all(&mut self) {
        for (_, (handle, _)) in self.timers.drain() {
            self.scheduler.cancel(handle);
        }
        self.dirty.clear();
    }

    pub fn mark_dirty(&mut self, id: &NoteId) {
        self.dirty.insert(id.clone());
    }

    pub fn clear_dirty(&mut self, id: &NoteId) {
        self.dirty.remove(id);
    }

    pub fn is_dirty(&self, id: &NoteId) -> bool {
        self.dirty.contains(id)
    }
}
