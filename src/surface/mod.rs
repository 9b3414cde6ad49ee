//! The visual list of note cards.
//!
//! The reconciler only talks to these traits; `DomSurface` renders into a
//! real container element, tests use an in-memory surface.

pub(crate) mod dom;
#[cfg(test)]
pub(crate) mod memory;

pub use dom::DomSurface;

use crate::caret::{CaretHost, SelectionSnapshot};
use crate::models::NoteId;

/// What the notes area shows besides the cards themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewState {
    /// No batch received yet.
    Loading,
    /// Zero notes: a placeholder is shown instead of cards.
    Empty,
    Notes,
    /// The change stream failed; replaces the list.
    Failed(String),
}

/// Editable content area of a card.
pub trait ContentRegion: CaretHost {
    fn markup(&self) -> String;

    fn set_markup(&self, markup: &str);

    fn focus(&self);

    fn has_focus(&self) -> bool;
}

/// Owned handle to one rendered card.
pub trait CardHandle: Clone {
    type Region: ContentRegion;

    fn region(&self) -> &Self::Region;

    /// Flag the card as having an unsaved (failed) write.
    fn set_dirty(&self, dirty: bool);
}

pub trait CardSurface {
    type Card: CardHandle;

    /// Build a detached card. It becomes visible once inserted.
    ///
    /// `None` only when the host cannot create elements at all.
    fn create_card(&self, id: &NoteId, content: &str) -> Option<Self::Card>;

    /// Insert `card` before `anchor`, or append when `anchor` is `None`.
    /// An already attached card is moved.
    fn insert_before(&self, card: &Self::Card, anchor: Option<&Self::Card>);

    fn remove(&self, card: &Self::Card);

    /// Drop keyboard focus without moving it to another card.
    fn clear_focus(&self);

    fn set_view_state(&self, state: &ViewState);
}

pub type RegionOf<H> = <H as CardHandle>::Region;
pub type AnchorOf<H> = <RegionOf<H> as CaretHost>::Anchor;
pub type CaretOf<H> = SelectionSnapshot<AnchorOf<H>>;
