use crate::models::OrderKey;

/// Wall clock in milliseconds; the order key of a note created now.
pub(crate) fn now_ms() -> OrderKey {
    js_sys::Date::now().round() as OrderKey
}

/// Plain text of a pasted clipboard payload, with line endings normalized.
pub(crate) fn normalize_pasted_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
