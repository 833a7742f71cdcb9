//! Sliding-window text chunker with boundary-aware splitting.
//!
//! Splits document text into overlapping windows of `chunk_size` characters
//! (default ~1500) with `chunk_overlap` characters of overlap (default
//! ~300). Each window boundary is nudged backward to land on a paragraph
//! break, failing that a sentence break, failing that whitespace, before
//! falling back to a hard mid-word split.
//!
//! Each chunk receives a deterministic ID — the SHA-256 hash of its relative
//! source path, its ordinal, and its text — so that re-chunking identical
//! content reproduces identical IDs across runs.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::models::Chunk;

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]|]+)(?:\|[^\[\]]*)?\]\]").unwrap())
}

/// Split `text` (the contents of `source_path`) into overlapping [`Chunk`]s.
///
/// Empty input produces zero chunks; input smaller than one window produces
/// a single chunk; long input produces as many windows as needed with no
/// further limit.
pub fn chunk_text(source_path: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let len = text.len();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < len {
        let hard_end = floor_char_boundary(text, (start + chunk_size).min(len));
        let end = if hard_end < len {
            boundary_split(text, start, hard_end)
        } else {
            hard_end
        };
        let mut end = floor_char_boundary(text, end.min(len));
        if end <= start {
            // Never produce an empty chunk: always consume at least the one
            // (possibly multi-byte) character starting at `start`.
            end = ceil_char_boundary(text, start + 1).min(len);
        }

        let piece = &text[start..end];
        chunks.push(make_chunk(source_path, index, piece));
        index += 1;

        if end >= len {
            break;
        }
        // Advance by `step`, but never past `end` (which would skip text).
        let next = floor_char_boundary(text, start + step);
        start = if next > start && next < end { next } else { end };
    }

    chunks
}

/// The largest char boundary `<= index`. `text[index]` itself may fall
/// inside a multi-byte character; this walks back to the start of that
/// character (or to `index` itself if it's already a boundary).
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut idx = index;
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// The smallest char boundary `>= index`, used to guarantee forward
/// progress past a multi-byte character that `index` falls inside of.
fn ceil_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut idx = index;
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Find the best split point in `text[start..hard_end]`, preferring a
/// paragraph break, then a sentence break, then whitespace, in that order.
fn boundary_split(text: &str, start: usize, hard_end: usize) -> usize {
    let window = &text[start..hard_end];

    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return start + pos + 2;
        }
    }
    if let Some(pos) = rfind_sentence_break(window) {
        return start + pos;
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            let ch_len = window[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
            return start + pos + ch_len;
        }
    }
    hard_end
}

fn rfind_sentence_break(window: &str) -> Option<usize> {
    let mut best: Option<usize> = None;
    for marker in [". ", "! ", "? ", ".\n", "!\n", "?\n"] {
        if let Some(pos) = window.rfind(marker) {
            let candidate = pos + marker.len();
            best = Some(best.map_or(candidate, |b: usize| b.max(candidate)));
        }
    }
    best
}

fn make_chunk(source_path: &str, index: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let id = format!("{:x}", hasher.finalize());

    Chunk {
        id,
        source_path: source_path.to_string(),
        chunk_index: index,
        text: text.to_string(),
        outbound_links: extract_wiki_links(text),
    }
}

/// Extract `[[target]]` / `[[target|display]]` wiki-link targets, storing
/// the target portion case-preserved with any folder prefix intact,
/// deduplicated in first-seen order.
pub fn extract_wiki_links(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for caps in wikilink_re().captures_iter(text) {
        let target = caps[1].trim().to_string();
        if !target.is_empty() && seen.insert(target.clone()) {
            out.push(target);
        }
    }
    out
}
