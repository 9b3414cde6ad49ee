//! Note id -> rendered card, kept in visual order.

use crate::models::{NoteId, OrderKey};
use crate::surface::{CardHandle, CaretOf};

pub struct Card<H: CardHandle> {
    pub id: NoteId,
    pub handle: H,
    pub order_key: OrderKey,
    /// Last content known to be rendered in the card.
    pub content: String,
    /// Caret cached on input/blur. Dropped whenever the content is replaced.
    pub caret: Option<CaretOf<H>>,
}

impl<H: CardHandle> Card<H> {
    pub fn new(id: NoteId, handle: H, order_key: OrderKey, content: String) -> Self {
        Self {
            id,
            handle,
            order_key,
            content,
            caret: None,
        }
    }
}

/// Cards in the order they are shown: `order_key` descending.
///
/// Lookups are linear. The list is a single user's notes, and each change
/// needs the neighbour anyway to insert before it.
pub struct CardRegistry<H: CardHandle> {
    cards: Vec<Card<H>>,
}

impl<H: CardHandle> Default for CardRegistry<H> {
    fn default() -> Self {
        Self { cards: Vec::new() }
    }
}

impl<H: CardHandle> CardRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &NoteId) -> Option<usize> {
        self.cards.iter().position(|c| &c.id == id)
    }

    pub fn get(&self, id: &NoteId) -> Option<&Card<H>> {
        self.cards.iter().find(|c| &c.id == id)
    }

    pub fn get_mut(&mut self, id: &NoteId) -> Option<&mut Card<H>> {
        self.cards.iter_mut().find(|c| &c.id == id)
    }

    pub fn first(&self) -> Option<&Card<H>> {
        self.cards.first()
    }

    pub fn at(&self, index: usize) -> Option<&Card<H>> {
        self.cards.get(index)
    }

    /// Index of the first card with a smaller order key.
    ///
    /// Equal keys stay ahead of the newcomer.
    pub fn insertion_index(&self, order_key: OrderKey) -> usize {
        self.cards
            .iter()
            .position(|c| c.order_key < order_key)
            .unwrap_or(self.cards.len())
    }

    /// Insert at `insertion_index(card.order_key)` and return that index.
    pub fn insert(&mut self, card: Card<H>) -> usize {
        let idx = self.insertion_index(card.order_key);
        self.cards.insert(idx, card);
        idx
    }

    pub fn remove(&mut self, id: &NoteId) -> Option<Card<H>> {
        let idx = self.position(id)?;
        Some(self.cards.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card<H>> {
        self.cards.iter()
    }

    pub fn ids(&self) -> Vec<NoteId> {
        self.cards.iter().map(|c| c.id.clone()).collect()
    }

    /// Record locally typed content so the store's echo of it is a no-op.
    ///
    /// Returns false for unknown ids.
    pub fn note_local_edit(
        &mut self,
        id: &NoteId,
        content: String,
        caret: Option<CaretOf<H>>,
    ) -> bool {
        let Some(card) = self.get_mut(id) else {
            return false;
        };
        card.content = content;
        if caret.is_some() {
            card.caret = caret;
        }
        true
    }
}
