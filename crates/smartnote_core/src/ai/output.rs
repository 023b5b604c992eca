//! Post-processing of raw model output.
//!
//! # Invariants
//! - `parse_tags` returns at most `MAX_TAGS_PER_NOTE` entries, each at most
//!   `MAX_TAG_CHARS` characters, in model order.

use crate::model::note::{MAX_TAGS_PER_NOTE, MAX_TAG_CHARS};
use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•·‣–—]+|\d+[.)])\s*").expect("valid leading marker regex")
});

/// Trimmed summary text.
pub fn clean_summary(raw: &str) -> &str {
    raw.trim()
}

/// Splits model output into tags.
///
/// Entries are split on commas and newlines, stripped of list markers,
/// quotes and `#`, then empty, over-long and case-insensitive duplicate
/// entries are dropped before capping the list.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for piece in raw.split([',', '\n', '，']) {
        let Some(tag) = clean_tag(piece) else {
            continue;
        };
        if tags
            .iter()
            .any(|existing| existing.to_lowercase() == tag.to_lowercase())
        {
            continue;
        }
        tags.push(tag);
        if tags.len() == MAX_TAGS_PER_NOTE {
            break;
        }
    }
    tags
}

fn clean_tag(piece: &str) -> Option<String> {
    let without_marker = LEADING_MARKER_RE.replace(piece, "");
    let tag = without_marker
        .trim()
        .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`' | '“' | '”'))
        .trim_start_matches('#')
        .trim();
    if tag.is_empty() || tag.chars().count() > MAX_TAG_CHARS {
        return None;
    }
    Some(tag.to_string())
}
