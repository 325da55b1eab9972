//! Completion promise extraction.
//!
//! An agent signals genuine completion by echoing the configured promise
//! phrase inside a `<promise>…</promise>` marker pair. Only the first pair
//! in the output counts, and the enclosed text is whitespace-normalized so
//! line wrapping inside the marker cannot break an otherwise exact match.

use regex::Regex;
use std::sync::OnceLock;

fn promise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<promise>(.*?)</promise>").expect("promise regex is valid"))
}

/// Extracts the first `<promise>…</promise>` marker from agent output.
///
/// Returns `None` when no marker pair is present — not an error. The
/// enclosed text comes back whitespace-collapsed and trimmed.
#[must_use]
pub fn extract_promise(text: &str) -> Option<String> {
    let caps = promise_re().captures(text)?;
    Some(collapse_whitespace(&caps[1]))
}

/// Collapses every whitespace run (including newlines) to a single space
/// and trims leading/trailing whitespace.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
