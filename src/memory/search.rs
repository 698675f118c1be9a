// src/memory/search.rs

//! Exact keyword matching over stored turns. No ranking, no limits.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::memory::types::Turn;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid regex"));

/// Lowercased word tokens (letters, digits, underscore) of `text`.
pub fn extract_words_lower(text: &str) -> HashSet<String> {
    WORD_RE
        .find_iter(text)
        .map(|word| word.as_str().to_lowercase())
        .collect()
}

/// Whether a stored turn shares at least one word token with the query set.
/// A turn whose text yields no tokens never matches.
pub fn turn_matches(turn: &Turn, query_words: &HashSet<String>) -> bool {
    let turn_words = extract_words_lower(&turn.text());
    if turn_words.is_empty() {
        return false;
    }
    query_words.iter().any(|word| turn_words.contains(word))
}
