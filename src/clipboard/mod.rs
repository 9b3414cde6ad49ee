//! Clipboard payloads for paste into a card.

use crate::util::normalize_pasted_text;
use futures::channel::oneshot;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipboardError {
    #[error("could not read pasted file: {0}")]
    Read(String),
    #[error("file read was abandoned")]
    Cancelled,
}

impl From<JsValue> for ClipboardError {
    fn from(e: JsValue) -> Self {
        ClipboardError::Read(e.as_string().unwrap_or_else(|| format!("{e:?}")))
    }
}

pub(crate) fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

pub enum Pasted {
    Image(web_sys::File),
    Text(String),
    Nothing,
}

/// What a paste event carries. An image wins over text.
pub fn read_paste(ev: &web_sys::ClipboardEvent) -> Pasted {
    let Some(data) = ev.clipboard_data() else {
        return Pasted::Nothing;
    };

    let items = data.items();
    for i in 0..items.length() {
        let Some(item) = items.get(i) else {
            continue;
        };
        if item.kind() == "file" && is_image_mime(&item.type_()) {
            if let Ok(Some(file)) = item.get_as_file() {
                return Pasted::Image(file);
            }
        }
    }

    match data.get_data("text/plain") {
        Ok(text) if !text.is_empty() => Pasted::Text(normalize_pasted_text(&text)),
        _ => Pasted::Nothing,
    }
}

type Reply = Rc<RefCell<Option<oneshot::Sender<Result<String, ClipboardError>>>>>;

/// Read a blob into a `data:` URL.
pub async fn read_as_data_url(blob: &web_sys::Blob) -> Result<String, ClipboardError> {
    let reader = web_sys::FileReader::new()?;
    let (tx, rx) = oneshot::channel();
    let reply: Reply = Rc::new(RefCell::new(Some(tx)));

    let onload = {
        let reply = reply.clone();
        let reader = reader.clone();
        Closure::wrap(Box::new(move || {
            let result = reader
                .result()
                .map_err(ClipboardError::from)
                .and_then(|v| {
                    v.as_string()
                        .ok_or_else(|| ClipboardError::Read("result is not a string".to_string()))
                });
            if let Some(tx) = reply.borrow_mut().take() {
                let _ = tx.send(result);
            }
        }) as Box<dyn FnMut()>)
    };
    let onerror = {
        let reply = reply.clone();
        Closure::wrap(Box::new(move || {
            if let Some(tx) = reply.borrow_mut().take() {
                let _ = tx.send(Err(ClipboardError::Read("reader error".to_string())));
            }
        }) as Box<dyn FnMut()>)
    };

    reader.set_onload(Some(onload.as_ref().unchecked_ref()));
    reader.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    reader.read_as_data_url(blob)?;

    let result = rx.await.unwrap_or(Err(ClipboardError::Cancelled));
    reader.set_onload(None);
    reader.set_onerror(None);
    result
}
