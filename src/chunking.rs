//! # Chunker
//!
//! Splits document text into overlapping windows using a recursive-split
//! strategy: try the largest separator first and fall back to smaller
//! ones only where a window still doesn't fit. Pure and infallible —
//! there is no `Result` here, only `Vec<Chunk>`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separators tried in decreasing order of semantic size.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// A single chunk of a document, ready for embedding and upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
}

/// Splitting parameters. Mirrors the defaults in [`crate::config::Config`]
/// but is kept separate so tests can exercise small values cheaply.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Deterministic chunk identity: a pure function of `(document_id, chunk_index)`
/// under the nil UUID namespace, so re-processing the same event replaces
/// points in place instead of duplicating them.
pub fn chunk_id(document_id: Uuid, chunk_index: usize) -> Uuid {
    let name = format!("{document_id}:{chunk_index}");
    Uuid::new_v5(&Uuid::nil(), name.as_bytes())
}

/// Split `content` into chunks of at most `params.chunk_size` characters,
/// with `params.chunk_overlap` characters of overlap between consecutive
/// chunks. Returns an empty vector for empty content.
pub fn chunk_document(document_id: Uuid, content: &str, params: ChunkParams) -> Vec<Chunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let pieces = recursive_split(content, params.chunk_size, params.chunk_overlap);
    pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| Chunk {
            id: chunk_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content,
        })
        .collect()
}

/// Recursively split `text` on the largest separator that produces windows
/// fitting `chunk_size`, falling back to a hard character split when no
/// separator helps. Overlap is applied by re-walking the produced windows
/// with a sliding start offset.
fn recursive_split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let (splits, separator) = split_on_best_separator(text);
    let merged = merge_splits(&splits, separator, chunk_size, chunk_overlap);

    // A single oversized piece with no usable separator: fall back to a
    // hard character-window split so we always make progress.
    if merged.len() == 1 && merged[0].chars().count() > chunk_size {
        return hard_split(&merged[0], chunk_size, chunk_overlap);
    }

    merged
        .into_iter()
        .flat_map(|piece| {
            if piece.chars().count() > chunk_size {
                recursive_split(&piece, chunk_size, chunk_overlap)
            } else {
                vec![piece]
            }
        })
        .collect()
}

/// Try each separator in turn; the first that actually splits the text
/// into more than one piece wins. Returns the pieces alongside the exact
/// separator that produced them, so callers can rejoin without losing or
/// substituting characters that were present in the source text.
fn split_on_best_separator(text: &str) -> (Vec<String>, &'static str) {
    for sep in SEPARATORS {
        let parts: Vec<&str> = text.split(sep).collect();
        if parts.len() > 1 {
            return (parts.iter().map(|s| s.to_string()).collect(), sep);
        }
    }
    (vec![text.to_string()], "")
}

/// Greedily pack adjacent pieces into windows of at most `chunk_size`
/// characters, carrying `chunk_overlap` characters of trailing context
/// from one window into the next. Pieces are rejoined with `separator`
/// (the exact text `split_on_best_separator` consumed to produce them)
/// rather than an assumed delimiter, so every window stays a substring
/// of the original document.
fn merge_splits(pieces: &[String], separator: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();
    let separator_len = separator.chars().count();

    for piece in pieces {
        let candidate_len = if current.is_empty() {
            piece.chars().count()
        } else {
            current.chars().count() + separator_len + piece.chars().count()
        };

        if candidate_len > chunk_size && !current.is_empty() {
            windows.push(current.clone());
            let overlap_tail = tail_chars(&current, chunk_overlap);
            current = overlap_tail;
        }

        if !current.is_empty() {
            current.push_str(separator);
        }
        current.push_str(piece);
    }

    if !current.is_empty() {
        windows.push(current);
    }

    if windows.is_empty() {
        windows.push(String::new());
    }
    windows
}

/// Hard character-window split used only when no separator produces
/// small-enough pieces (e.g. one long unbroken token).
fn hard_split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= n {
        s.to_string()
    } else {
        chars[chars.len() - n..].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn chunk_id_is_deterministic() {
        let doc = Uuid::new_v4();
        let a = chunk_id(doc, 3);
        let b = chunk_id(doc, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_id_differs_across_index() {
        let doc = Uuid::new_v4();
        assert_ne!(chunk_id(doc, 0), chunk_id(doc, 1));
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let doc = Uuid::new_v4();
        let chunks = chunk_document(doc, "short text", ChunkParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].id, chunk_id(doc, 0));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let doc = Uuid::new_v4();
        assert!(chunk_document(doc, "", ChunkParams::default()).is_empty());
    }

    #[test]
    fn long_text_yields_multiple_chunks_with_correct_ids() {
        let doc = Uuid::new_v4();
        let content = "paragraph one is here.\n\n".repeat(200);
        let params = ChunkParams {
            chunk_size: 100,
            chunk_overlap: 20,
        };
        let chunks = chunk_document(doc, &content, params);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.id, chunk_id(doc, i));
            assert!(chunk.content.chars().count() <= params.chunk_size + params.chunk_overlap);
        }
    }

    #[test]
    fn chunks_on_sentence_boundary_preserve_the_period() {
        let doc = Uuid::new_v4();
        let content = "Hello world. This is a test.";
        let params = ChunkParams {
            chunk_size: 15,
            chunk_overlap: 0,
        };
        let chunks = chunk_document(doc, content, params);
        for chunk in &chunks {
            assert!(
                content.contains(&chunk.content),
                "chunk {:?} is not a substring of the source document",
                chunk.content
            );
        }
    }

    proptest! {
        #[test]
        fn chunk_id_is_pure(doc_bytes: [u8; 16], idx in 0usize..10_000) {
            let doc = Uuid::from_bytes(doc_bytes);
            prop_assert_eq!(chunk_id(doc, idx), chunk_id(doc, idx));
        }

        #[test]
        fn indices_are_sequential(text in "\\PC{0,4000}") {
            let doc = Uuid::new_v4();
            let chunks = chunk_document(doc, &text, ChunkParams::default());
            for (i, c) in chunks.iter().enumerate() {
                prop_assert_eq!(c.chunk_index, i);
            }
        }
    }
}
