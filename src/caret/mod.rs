//! Caret capture/restore around content mutation.
//!
//! A snapshot stores the node the selection starts in plus offsets inside
//! that node. It is only meaningful while that node is still part of the
//! region's content tree; once the content is replaced the snapshot is
//! stale and restoring it falls back to the end of the content.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaretError {
    #[error("no selection available")]
    NoSelection,
    #[error("selection rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionSnapshot<A> {
    pub anchor: A,
    pub start: u32,
    pub end: u32,
    /// Caret position counted in text units from the start of the region.
    pub text_offset: u32,
}

/// Editable region whose selection can be read and placed.
pub trait CaretHost {
    type Anchor: Clone;

    /// Current selection, if it starts inside this region.
    fn selection_in_region(&self) -> Option<SelectionSnapshot<Self::Anchor>>;

    fn contains_anchor(&self, anchor: &Self::Anchor) -> bool;

    fn select(&self, snapshot: &SelectionSnapshot<Self::Anchor>) -> Result<(), CaretError>;

    fn collapse_to_end(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaretRestore {
    Exact,
    End,
}

pub fn capture<H: CaretHost>(host: &H) -> Option<SelectionSnapshot<H::Anchor>> {
    host.selection_in_region()
}

/// Never fails: a stale or rejected anchor lands the caret at the end.
pub fn restore<H: CaretHost>(host: &H, snapshot: &SelectionSnapshot<H::Anchor>) -> CaretRestore {
    if host.contains_anchor(&snapshot.anchor) && host.select(snapshot).is_ok() {
        return CaretRestore::Exact;
    }
    host.collapse_to_end();
    CaretRestore::End
}
