//! Tag list parsing.
//!
//! Articles carry tags as a free-text, comma-separated string. This module
//! turns that string into the ordered list of names the tag associator
//! persists. Matching is case-insensitive: `Python` and `python` name the
//! same tag, and the first spelling in the list wins.

use std::collections::HashSet;

use crate::defaults::MAX_TAG_NAME_LEN;

/// Outcome of parsing a raw tag string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTags {
    /// Names to associate, in input order, deduplicated case-insensitively.
    pub accepted: Vec<String>,
    /// Names skipped for exceeding [`MAX_TAG_NAME_LEN`] characters.
    pub rejected: Vec<String>,
}

impl ParsedTags {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Whether a raw tag string leaves the article's tags untouched.
///
/// Only blank input is a no-op. A string such as `","` is not blank and
/// therefore clears every association.
pub fn is_noop(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// Case-folded key used for matching and deduplication.
pub fn tag_key(name: &str) -> String {
    name.to_lowercase()
}

/// Split, trim, drop empty fragments, reject over-long names and dedupe.
pub fn parse_tag_list(raw: &str) -> ParsedTags {
    let mut parsed = ParsedTags::default();
    let mut seen = HashSet::new();

    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if name.chars().count() > MAX_TAG_NAME_LEN {
            parsed.rejected.push(name.to_string());
            continue;
        }
        if seen.insert(tag_key(name)) {
            parsed.accepted.push(name.to_string());
        }
    }

    parsed
}
