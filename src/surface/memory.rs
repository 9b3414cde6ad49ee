//! In-memory surface for native tests.
//!
//! Each `set_markup` replaces the region's single text node with a fresh
//! node id, so anchors captured before a replacement go stale exactly like
//! DOM text nodes do.

use super::{CardHandle, CardSurface, ContentRegion, ViewState};
use crate::caret::{CaretError, CaretHost, SelectionSnapshot};
use crate::models::NoteId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct Doc {
    next_id: u64,
    focused_region: Option<u64>,
    /// (region uid, node id, start, end)
    selection: Option<(u64, u64, u32, u32)>,
}

impl Doc {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct RegionState {
    markup: String,
    node: u64,
    writes: usize,
}

#[derive(Clone)]
pub(crate) struct MemRegion {
    uid: u64,
    doc: Rc<RefCell<Doc>>,
    state: Rc<RefCell<RegionState>>,
}

impl MemRegion {
    fn text_len(&self) -> u32 {
        self.state.borrow().markup.chars().count() as u32
    }

    /// Focus the region and put a collapsed caret at `offset`.
    pub(crate) fn place_caret(&self, offset: u32) {
        let node = self.state.borrow().node;
        let offset = offset.min(self.text_len());
        let mut doc = self.doc.borrow_mut();
        doc.focused_region = Some(self.uid);
        doc.selection = Some((self.uid, node, offset, offset));
    }

    /// Number of content replacements since creation.
    pub(crate) fn writes(&self) -> usize {
        self.state.borrow().writes
    }

    /// Simulate the user typing: content changes, caret stays at `caret`.
    pub(crate) fn type_text(&self, markup: &str, caret: u32) {
        {
            let mut doc = self.doc.borrow_mut();
            let node = doc.alloc();
            let mut state = self.state.borrow_mut();
            state.markup = markup.to_string();
            state.node = node;
        }
        self.place_caret(caret);
    }
}

impl CaretHost for MemRegion {
    type Anchor = u64;

    fn selection_in_region(&self) -> Option<SelectionSnapshot<u64>> {
        let (uid, node, start, end) = self.doc.borrow().selection?;
        if uid != self.uid {
            return None;
        }
        Some(SelectionSnapshot {
            anchor: node,
            start,
            end,
            text_offset: start,
        })
    }

    fn contains_anchor(&self, anchor: &u64) -> bool {
        self.state.borrow().node == *anchor
    }

    fn select(&self, snapshot: &SelectionSnapshot<u64>) -> Result<(), CaretError> {
        let len = self.text_len();
        if snapshot.start > len || snapshot.end > len {
            return Err(CaretError::Rejected("offset out of range".to_string()));
        }
        self.doc.borrow_mut().selection =
            Some((self.uid, snapshot.anchor, snapshot.start, snapshot.end));
        Ok(())
    }

    fn collapse_to_end(&self) {
        let node = self.state.borrow().node;
        let len = self.text_len();
        self.doc.borrow_mut().selection = Some((self.uid, node, len, len));
    }
}

impl ContentRegion for MemRegion {
    fn markup(&self) -> String {
        self.state.borrow().markup.clone()
    }

    fn set_markup(&self, markup: &str) {
        let node = self.doc.borrow_mut().alloc();
        let mut state = self.state.borrow_mut();
        state.markup = markup.to_string();
        state.node = node;
        state.writes += 1;
    }

    fn focus(&self) {
        self.doc.borrow_mut().focused_region = Some(self.uid);
    }

    fn has_focus(&self) -> bool {
        self.doc.borrow().focused_region == Some(self.uid)
    }
}

struct CardInner {
    id: NoteId,
    region: MemRegion,
    moves: Cell<usize>,
    dirty: Cell<bool>,
}

#[derive(Clone)]
pub(crate) struct MemCard(Rc<CardInner>);

impl MemCard {
    pub(crate) fn id(&self) -> &NoteId {
        &self.0.id
    }

    pub(crate) fn same(&self, other: &MemCard) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of insert/move operations applied to this card.
    pub(crate) fn moves(&self) -> usize {
        self.0.moves.get()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }
}

impl CardHandle for MemCard {
    type Region = MemRegion;

    fn region(&self) -> &MemRegion {
        &self.0.region
    }

    fn set_dirty(&self, dirty: bool) {
        self.0.dirty.set(dirty);
    }
}

#[derive(Clone)]
pub(crate) struct MemSurface {
    doc: Rc<RefCell<Doc>>,
    cards: Rc<RefCell<Vec<MemCard>>>,
    view: Rc<RefCell<ViewState>>,
    focus_clears: Rc<Cell<usize>>,
}

impl MemSurface {
    pub(crate) fn new() -> Self {
        Self {
            doc: Rc::new(RefCell::new(Doc::default())),
            cards: Rc::new(RefCell::new(Vec::new())),
            view: Rc::new(RefCell::new(ViewState::Loading)),
            focus_clears: Rc::new(Cell::new(0)),
        }
    }

    pub(crate) fn cards(&self) -> Vec<MemCard> {
        self.cards.borrow().clone()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.cards
            .borrow()
            .iter()
            .map(|c| c.id().to_string())
            .collect()
    }

    pub(crate) fn card(&self, id: &str) -> Option<MemCard> {
        self.cards
            .borrow()
            .iter()
            .find(|c| c.id().as_str() == id)
            .cloned()
    }

    pub(crate) fn focused_id(&self) -> Option<String> {
        self.cards
            .borrow()
            .iter()
            .find(|c| c.region().has_focus())
            .map(|c| c.id().to_string())
    }

    pub(crate) fn view_state(&self) -> ViewState {
        self.view.borrow().clone()
    }

    /// Number of `clear_focus` calls.
    pub(crate) fn focus_clears(&self) -> usize {
        self.focus_clears.get()
    }
}

impl CardSurface for MemSurface {
    type Card = MemCard;

    fn create_card(&self, id: &NoteId, content: &str) -> Option<MemCard> {
        let (uid, node) = {
            let mut doc = self.doc.borrow_mut();
            (doc.alloc(), doc.alloc())
        };
        Some(MemCard(Rc::new(CardInner {
            id: id.clone(),
            region: MemRegion {
                uid,
                doc: self.doc.clone(),
                state: Rc::new(RefCell::new(RegionState {
                    markup: content.to_string(),
                    node,
                    writes: 0,
                })),
            },
            moves: Cell::new(0),
            dirty: Cell::new(false),
        })))
    }

    fn insert_before(&self, card: &MemCard, anchor: Option<&MemCard>) {
        let mut cards = self.cards.borrow_mut();
        cards.retain(|c| !c.same(card));
        let idx = anchor
            .and_then(|a| cards.iter().position(|c| c.same(a)))
            .unwrap_or(cards.len());
        cards.insert(idx, card.clone());
        card.0.moves.set(card.0.moves.get() + 1);

        // Moving a node drops focus, as in the DOM.
        let mut doc = self.doc.borrow_mut();
        if doc.focused_region == Some(card.region().uid) {
            doc.focused_region = None;
        }
    }

    fn remove(&self, card: &MemCard) {
        self.cards.borrow_mut().retain(|c| !c.same(card));
        let mut doc = self.doc.borrow_mut();
        if doc.focused_region == Some(card.region().uid) {
            doc.focused_region = None;
            doc.selection = None;
        }
    }

    fn clear_focus(&self) {
        self.focus_clears.set(self.focus_clears.get() + 1);
        let mut doc = self.doc.borrow_mut();
        doc.focused_region = None;
        doc.selection = None;
    }

    fn set_view_state(&self, state: &ViewState) {
        *self.view.borrow_mut() = state.clone();
    }
}
