//! Jotter: a note-card widget kept in sync with a pushed change stream.
//!
//! The card list is owned by [`reconciler::Reconciler`], which applies
//! [`models::ChangeBatch`]es in place so the card being typed in keeps focus
//! and caret. [`controller::NotesSession`] wires it to a [`store::NoteStore`]
//! and debounces edits through [`session::EditSession`].

mod api;
mod app;
mod auth;
pub mod caret;
mod clipboard;
mod components;
mod config;
pub mod controller;
pub mod models;
mod pages;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod session;
mod state;
mod storage;
pub mod store;
pub mod surface;
mod util;

pub use app::App;

use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    mount_to_body(App);
}
