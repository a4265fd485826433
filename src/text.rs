// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text normalization and character-offset helpers.
//!
//! Every offset produced by the engine (chunk bounds, match segments) is a
//! character offset into the output of [`normalize`]. Texts are normalized
//! exactly once, on entry, and never re-derived from another representation.

use once_cell::sync::Lazy;
use regex::Regex;

static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0e-\x1f\x7f]").expect("valid control regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Normalizes extracted text.
///
/// Control characters are dropped, every whitespace run (line breaks and
/// page breaks included) becomes a single space, and the result is trimmed.
pub fn normalize(text: &str) -> String {
    let without_control = CONTROL_RE.replace_all(text, "");
    let collapsed = WHITESPACE_RE.replace_all(&without_control, " ");
    collapsed.trim().to_string()
}

/// Returns true when the text has nothing but whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Number of characters (not bytes) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Builds a string from a character range.
pub fn slice_chars(chars: &[char], start: usize, end: usize) -> String {
    let end = end.min(chars.len());
    let start = start.min(end);
    chars[start..end].iter().collect()
}

/// Lowercase word set used for word-overlap scoring.
pub fn word_set(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
