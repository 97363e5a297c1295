//! Query-text normalization for textual dependency inference.
//!
//! The engine never parses SQL. A dependency is inferred when one
//! artifact's key appears, bounded by non-identifier characters, inside
//! another's rendered text after both sides are normalized.

use std::sync::LazyLock;

use regex::Regex;

static NON_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z._]+").expect("static regex"));

/// Collapses every run of non-identifier characters to a single space.
pub fn normalize(text: &str) -> String {
    NON_IDENTIFIER.replace_all(text, " ").into_owned()
}

/// `contained` appears in `container` and is strictly shorter than it.
pub fn strict_substring(contained: &str, container: &str) -> bool {
    container.contains(contained) && contained.len() < container.len()
}

/// Whether `key` appears in `text`, bounded by non-identifier characters.
///
/// Both sides are normalized; the container is padded so hits at either end
/// of the text still count as bounded.
pub fn contains_key(text: &str, key: &str) -> bool {
    let container = format!(" {} ", normalize(text));
    let needle = format!(" {} ", normalize(key));
    strict_substring(&needle, &container)
}
