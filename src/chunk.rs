//! Paragraph-boundary text chunker.
//!
//! Splits a [`SourceDocument`] into [`Node`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`);
//! each new node starts with up to `overlap_tokens` of trailing text from
//! the previous one so that answers spanning a boundary stay retrievable.
//!
//! Every node inherits the document metadata and gets a SHA-256 hash of its
//! text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Node, SourceDocument};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split a document into nodes with contiguous indices starting at 0.
///
/// Documents with no text yield no nodes.
pub fn chunk_document(doc: &SourceDocument, max_tokens: usize, overlap_tokens: usize) -> Vec<Node> {
    split_text(&doc.text, max_tokens, overlap_tokens)
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_node(doc, i as i64, text))
        .collect()
}

/// Split text into pieces of at most `max_tokens` (plus overlap).
pub fn split_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    pieces.push(piece.to_string());
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    if overlap_chars == 0 || pieces.len() < 2 {
        return pieces;
    }

    let mut with_overlap = Vec::with_capacity(pieces.len());
    with_overlap.push(pieces[0].clone());
    for pair in pieces.windows(2) {
        let tail = overlap_tail(&pair[0], overlap_chars);
        if tail.is_empty() {
            with_overlap.push(pair[1].clone());
        } else {
            with_overlap.push(format!("{} {}", tail, pair[1]));
        }
    }
    with_overlap
}

/// The last `max_chars` bytes of `text`, starting on a word boundary.
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut start = text.len() - max_chars;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => tail,
    }
}

/// Largest char boundary `<= index`, so byte slicing never splits a code point.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        // A single code point wider than the budget; take it whole.
        text.char_indices().nth(1).map(|(p, _)| p).unwrap_or(text.len())
    } else {
        i
    }
}

fn make_node(doc: &SourceDocument, index: i64, text: String) -> Node {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Node {
        id: Uuid::new_v4().to_string(),
        file_name: doc.name.clone(),
        node_index: index,
        text,
        hash,
        metadata: doc.metadata.clone(),
        vector: None,
    }
}
