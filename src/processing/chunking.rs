//! Character-budgeted chunking with a sliding overlap.
//!
//! Boundaries come from `semchunk-rs`, which splits on the coarsest separator available
//! (newlines, then whitespace, then punctuation, then characters) and merges pieces up to a
//! budget. That budget is `chunk_size - chunk_overlap` characters, so the overlap pass can
//! prepend up to `chunk_overlap` characters from the preceding text without a chunk exceeding
//! `chunk_size`. Overlap tails are sliced from the source and start on a word boundary unless
//! the tail is a single unbroken run. Lengths are measured in `char`s.

use super::types::{SourceUnit, TextChunk};
use semchunk_rs::Chunker;
use thiserror::Error;

/// Default target chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Invalid splitter parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// A zero chunk size can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new content in each chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge {
        /// Configured chunk size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Deterministic chunker over `semchunk-rs` with overlap.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    /// Build a splitter, rejecting parameters that could not make progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split every unit and attach its provenance and in-unit offset to each chunk.
    pub fn split_units(&self, units: &[SourceUnit]) -> Vec<TextChunk> {
        units
            .iter()
            .flat_map(|unit| {
                self.split_with_offsets(&unit.text)
                    .into_iter()
                    .map(move |(start_index, text)| TextChunk {
                        text,
                        metadata: unit.metadata.clone(),
                        start_index,
                    })
            })
            .collect()
    }

    /// Split raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_offsets(text)
            .into_iter()
            .map(|(_, chunk)| chunk)
            .collect()
    }

    /// Chunks paired with their starting character offset in `text`.
    fn split_with_offsets(&self, text: &str) -> Vec<(usize, String)> {
        let chunker = Chunker::new(
            self.chunk_size - self.chunk_overlap,
            Box::new(|segment: &str| char_len(segment)),
        );

        let mut chunks = Vec::new();
        let mut cursor = 0;
        let mut previous_start = None;
        for base in chunker.chunk(text) {
            let base = base.trim();
            if base.is_empty() {
                continue;
            }

            let Some(found) = text[cursor..].find(base) else {
                // Not a verbatim slice of the source; keep it without overlap.
                chunks.push((char_len(&text[..cursor]), base.to_string()));
                previous_start = None;
                continue;
            };
            let start = cursor + found;
            let end = start + base.len();
            let from = previous_start.map_or(start, |floor| {
                overlap_start(text, floor, start, self.chunk_overlap)
            });

            chunks.push((char_len(&text[..from]), text[from..end].to_string()));
            previous_start = Some(start);
            cursor = end;
        }
        chunks
    }
}

/// Byte offset where the overlap tail for a chunk starting at `start` begins.
///
/// The tail never reaches back past `floor`, the start of the preceding chunk.
fn overlap_start(text: &str, floor: usize, start: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return start;
    }

    let region = &text[floor..start];
    let mut from = region
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map_or(0, |(idx, _)| idx);

    let cut_mid_word = from > 0
        && !region[..from].ends_with(char::is_whitespace)
        && !region[from..].starts_with(char::is_whitespace);
    if cut_mid_word {
        if let Some(gap) = region[from..].find(char::is_whitespace) {
            from += gap;
        }
    }

    let tail = &region[from..];
    floor + from + (tail.len() - tail.trim_start().len())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
