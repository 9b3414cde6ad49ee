use super::{CardHandle, CardSurface, ContentRegion, ViewState};
use crate::caret::{CaretError, CaretHost, SelectionSnapshot};
use crate::models::NoteId;
use leptos::prelude::*;
use wasm_bindgen::JsCast;

pub(crate) const CARD_CLASS: &str = "note";
pub(crate) const EDITABLE_CLASS: &str = "input__box";
pub(crate) const DELETE_NOTE_ACTION: &str = "delete-note";
pub(crate) const DELETE_IMAGE_ACTION: &str = "delete-image";

fn document() -> Option<web_sys::Document> {
    web_sys::window().and_then(|w| w.document())
}

fn create_html(doc: &web_sys::Document, tag: &str) -> Option<web_sys::HtmlElement> {
    doc.create_element(tag).ok()?.dyn_into().ok()
}

fn js_err(e: wasm_bindgen::JsValue) -> CaretError {
    CaretError::Rejected(e.as_string().unwrap_or_else(|| format!("{e:?}")))
}

/// The contenteditable element of one card.
#[derive(Clone, Debug)]
pub struct DomRegion {
    el: web_sys::HtmlElement,
}

impl DomRegion {
    pub fn new(el: web_sys::HtmlElement) -> Self {
        Self { el }
    }

    pub fn element(&self) -> &web_sys::HtmlElement {
        &self.el
    }

    fn selection() -> Option<web_sys::Selection> {
        web_sys::window()?.get_selection().ok().flatten()
    }

    /// Current range, if it starts inside this region.
    fn range_in_region(&self) -> Option<web_sys::Range> {
        let sel = Self::selection()?;
        if sel.range_count() == 0 {
            return None;
        }
        let range = sel.get_range_at(0).ok()?;
        let start = range.start_container().ok()?;
        self.el.contains(Some(&start)).then_some(range)
    }

    fn apply_range(range: &web_sys::Range) -> Result<(), CaretError> {
        let sel = Self::selection().ok_or(CaretError::NoSelection)?;
        sel.remove_all_ranges().map_err(js_err)?;
        sel.add_range(range).map_err(js_err)
    }

    /// Replace the selection with `node` and put the caret after `caret_after`.
    ///
    /// Appends to the end of the region when the selection is elsewhere.
    fn insert_at_caret(&self, node: &web_sys::Node, caret_after: &web_sys::Node) {
        match self.range_in_region() {
            Some(range) => {
                let _ = range.delete_contents();
                let _ = range.insert_node(node);
            }
            None => {
                let _ = self.el.append_child(node);
            }
        }

        let Some(doc) = document() else {
            return;
        };
        if let Ok(range) = doc.create_range() {
            if range.set_start_after(caret_after).is_ok() {
                range.collapse_with_to_start(true);
                let _ = Self::apply_range(&range);
            }
        }
    }

    /// Insert plain text at the caret.
    pub fn insert_text(&self, text: &str) {
        let Some(doc) = document() else {
            return;
        };
        let node = doc.create_text_node(text);
        self.insert_at_caret(&node, &node);
    }

    /// Insert an image figure followed by a line break at the caret.
    pub fn insert_image(&self, data_url: &str) {
        let Some(doc) = document() else {
            return;
        };
        let (Some(figure), Some(img), Some(del), Some(br)) = (
            create_html(&doc, "figure"),
            doc.create_element("img")
                .ok()
                .and_then(|e| e.dyn_into::<web_sys::HtmlImageElement>().ok()),
            create_html(&doc, "button"),
            create_html(&doc, "br"),
        ) else {
            return;
        };

        figure.set_class_name("note-media");
        let _ = figure.set_attribute("contenteditable", "false");
        img.set_src(data_url);
        img.set_alt("");
        img.set_draggable(false);
        del.set_class_name(DELETE_IMAGE_ACTION);
        del.set_text_content(Some("\u{00d7}"));
        let _ = del.set_attribute("type", "button");
        let _ = del.set_attribute("data-action", DELETE_IMAGE_ACTION);
        let _ = del.set_attribute("aria-label", "Remove image");
        let _ = figure.append_child(&img);
        let _ = figure.append_child(&del);

        let fragment = doc.create_document_fragment();
        let _ = fragment.append_child(&figure);
        let _ = fragment.append_child(&br);
        self.insert_at_caret(&fragment, &br);
    }

    /// Remove an embedded figure and the line break that follows it.
    ///
    /// Returns false if `figure` is not inside this region.
    pub fn remove_figure(&self, figure: &web_sys::Element) -> bool {
        if !self.el.contains(Some(figure.as_ref())) {
            return false;
        }
        if let Some(next) = figure.next_sibling() {
            if next.node_name().eq_ignore_ascii_case("br") {
                if let Some(parent) = next.parent_node() {
                    let _ = parent.remove_child(&next);
                }
            }
        }
        figure.remove();
        true
    }
}

impl CaretHost for DomRegion {
    type Anchor = web_sys::Node;

    fn selection_in_region(&self) -> Option<SelectionSnapshot<web_sys::Node>> {
        let range = self.range_in_region()?;
        let anchor = range.start_container().ok()?;
        let start = range.start_offset().ok()?;
        let end = match range.end_container() {
            Ok(end_node) if end_node.is_same_node(Some(&anchor)) => {
                range.end_offset().unwrap_or(start)
            }
            _ => start,
        };

        let text_offset = document()
            .and_then(|doc| doc.create_range().ok())
            .and_then(|pre| {
                pre.select_node_contents(&self.el).ok()?;
                pre.set_end(&anchor, start).ok()?;
                Some(pre.to_string().length())
            })
            .unwrap_or(0);

        Some(SelectionSnapshot {
            anchor,
            start,
            end,
            text_offset,
        })
    }

    fn contains_anchor(&self, anchor: &web_sys::Node) -> bool {
        anchor.is_connected() && self.el.contains(Some(anchor))
    }

    fn select(&self, snapshot: &SelectionSnapshot<web_sys::Node>) -> Result<(), CaretError> {
        let doc = document().ok_or(CaretError::NoSelection)?;
        let range = doc.create_range().map_err(js_err)?;
        range
            .set_start(&snapshot.anchor, snapshot.start)
            .map_err(js_err)?;
        range.set_end(&snapshot.anchor, snapshot.end).map_err(js_err)?;
        Self::apply_range(&range)
    }

    fn collapse_to_end(&self) {
        let Some(range) = document().and_then(|doc| doc.create_range().ok()) else {
            return;
        };
        if range.select_node_contents(&self.el).is_ok() {
            range.collapse_with_to_start(false);
            let _ = Self::apply_range(&range);
        }
    }
}

impl ContentRegion for DomRegion {
    fn markup(&self) -> String {
        self.el.inner_html()
    }

    fn set_markup(&self, markup: &str) {
        self.el.set_inner_html(markup);
    }

    fn focus(&self) {
        let _ = self.el.focus();
    }

    fn has_focus(&self) -> bool {
        document()
            .and_then(|doc| doc.active_element())
            .map(|active| active.is_same_node(Some(self.el.as_ref())))
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
pub struct DomCard {
    root: web_sys::HtmlElement,
    region: DomRegion,
}

impl CardHandle for DomCard {
    type Region = DomRegion;

    fn region(&self) -> &DomRegion {
        &self.region
    }

    fn set_dirty(&self, dirty: bool) {
        let _ = self
            .root
            .class_list()
            .toggle_with_force("is-dirty", dirty);
    }
}

/// Renders cards into a container element owned by the notes page.
#[derive(Clone)]
pub struct DomSurface {
    container: web_sys::HtmlElement,
    view_state: RwSignal<ViewState>,
}

impl DomSurface {
    pub fn new(container: web_sys::HtmlElement, view_state: RwSignal<ViewState>) -> Self {
        Self {
            container,
            view_state,
        }
    }

    fn build_card(id: &NoteId, content: &str) -> Option<DomCard> {
        let doc = document()?;
        let root = create_html(&doc, "div")?;
        root.set_class_name(CARD_CLASS);
        let _ = root.set_attribute("data-id", id.as_str());

        let del = create_html(&doc, "button")?;
        del.set_class_name("note__delete");
        del.set_text_content(Some("\u{00d7}"));
        let _ = del.set_attribute("type", "button");
        let _ = del.set_attribute("data-action", DELETE_NOTE_ACTION);
        let _ = del.set_attribute("aria-label", "Delete note");

        let p = create_html(&doc, "p")?;
        p.set_class_name(EDITABLE_CLASS);
        p.set_content_editable("true");
        p.set_spellcheck(false);
        p.set_inner_html(content);

        let _ = root.append_child(&del);
        let _ = root.append_child(&p);

        Some(DomCard {
            root,
            region: DomRegion::new(p),
        })
    }
}

impl CardSurface for DomSurface {
    type Card = DomCard;

    fn create_card(&self, id: &NoteId, content: &str) -> Option<DomCard> {
        Self::build_card(id, content)
    }

    fn insert_before(&self, card: &DomCard, anchor: Option<&DomCard>) {
        let anchor_node: Option<&web_sys::Node> = anchor.map(|a| a.root.as_ref());
        let _ = self.container.insert_before(&card.root, anchor_node);
    }

    fn remove(&self, card: &DomCard) {
        card.root.remove();
    }

    fn clear_focus(&self) {
        let Some(active) = document().and_then(|doc| doc.active_element()) else {
            return;
        };
        if self.container.contains(Some(active.as_ref())) {
            if let Ok(el) = active.dyn_into::<web_sys::HtmlElement>() {
                let _ = el.blur();
            }
        }
        if let Some(sel) = DomRegion::selection() {
            let _ = sel.remove_all_ranges();
        }
    }

    fn set_view_state(&self, state: &ViewState) {
        self.view_state.set(state.clone());
    }
}

/// Note id of the card containing `target`.
pub(crate) fn card_id_of(target: &web_sys::Element) -> Option<NoteId> {
    let card = target.closest(&format!(".{CARD_CLASS}")).ok().flatten()?;
    card.get_attribute("data-id")
        .filter(|id| !id.trim().is_empty())
        .map(NoteId::new)
}

/// The editable region `target` belongs to, if any.
pub(crate) fn editable_of(target: &web_sys::Element) -> Option<DomRegion> {
    let el = target
        .closest(&format!(".{EDITABLE_CLASS}"))
        .ok()
        .flatten()?;
    el.dyn_into::<web_sys::HtmlElement>().ok().map(DomRegion::new)
}

/// Element an event was dispatched on.
pub(crate) fn event_element(ev: &web_sys::Event) -> Option<web_sys::Element> {
    ev.target()?.dyn_into::<web_sys::Element>().ok()
}
