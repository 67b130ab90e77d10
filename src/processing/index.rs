//! In-memory vector index with exact cosine k-nearest-neighbour search.
//!
//! An index is built once from a document's chunks and never mutated afterwards; replacing the
//! document means building a new index.

use super::types::TextChunk;
use thiserror::Error;

/// Errors raised while building or querying an index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// No chunks were supplied.
    #[error("cannot build an index from zero chunks")]
    Empty,
    /// Provider returned a different number of vectors than chunks.
    #[error("expected {chunks} vectors, got {vectors}")]
    CountMismatch {
        /// Chunks submitted for embedding.
        chunks: usize,
        /// Vectors returned by the provider.
        vectors: usize,
    },
    /// A vector's length differs from the index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the first vector.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },
}

struct IndexedChunk {
    chunk: TextChunk,
    vector: Vec<f32>,
}

/// Retrieval hit: a chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    /// Matched chunk.
    pub chunk: &'a TextChunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Immutable set of embedded chunks.
pub struct VectorIndex {
    entries: Vec<IndexedChunk>,
    dimension: usize,
}

impl VectorIndex {
    /// Pair each chunk with its vector. All vectors must share one non-zero dimension.
    pub fn build(chunks: Vec<TextChunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors[0].len();
        if let Some(bad) = vectors
            .iter()
            .find(|vector| vector.len() != dimension || vector.is_empty())
        {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();
        Ok(Self { entries, dimension })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks. Always `false` for a built index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension shared by every entry.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return up to `k` chunks ordered by descending similarity; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk<'_>>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<ScoredChunk<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: &entry.chunk,
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
