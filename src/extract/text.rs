//! Text normalization for label/value pairs harvested from specification tables.

use regex::Regex;
use std::sync::OnceLock;

/// Bidirectional formatting characters that storefronts sprinkle around labels
/// (LRM, RLM, embeddings/overrides, isolates and the Arabic letter mark).
const BIDI_CONTROLS: &str = "[\u{200E}\u{200F}\u{202A}-\u{202E}\u{2066}-\u{2069}\u{061C}]";

fn bidi_regex() -> &'static Regex {
    static BIDI: OnceLock<Regex> = OnceLock::new();
    BIDI.get_or_init(|| Regex::new(BIDI_CONTROLS).expect("bidi pattern is valid"))
}

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace_regex().replace_all(text, " ").trim().to_string()
}

/// Strip bidirectional control characters, collapse whitespace runs and trim.
///
/// Idempotent: `clean_text(&clean_text(s)) == clean_text(s)`.
pub fn clean_text(text: &str) -> String {
    let without_bidi = bidi_regex().replace_all(text, "");
    collapse_whitespace(&without_bidi)
}

/// Remove a leading copy of `key` from `value`.
///
/// Many layouts repeat the label inside the value cell ("Color: Red"). Both
/// sides are cleaned first; spaces and colons left over at either end of the
/// remainder are trimmed. Values that do not start with the key are returned
/// cleaned but otherwise unchanged.
pub fn remove_key_from_value(key: &str, value: &str) -> String {
    let key_cleaned = clean_text(key);
    let value_cleaned = clean_text(value);

    if key_cleaned.is_empty() {
        return value_cleaned;
    }

    match value_cleaned.strip_prefix(key_cleaned.as_str()) {
        Some(rest) => rest.trim_matches(|c| c == ' ' || c == ':').to_string(),
        None => value_cleaned,
    }
}
