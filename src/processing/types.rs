//! Core data types and error definitions for the document pipeline.

use crate::{embedding::EmbeddingClientError, generation::ChatClientError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that map to a 500-class response; the message is forwarded to the caller.
#[derive(Debug, Error)]
pub enum InternalError {
    /// Staging the upload on disk failed.
    #[error("failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
    /// The format-specific extractor rejected the document.
    #[error("{0}")]
    Extraction(#[from] super::loader::ExtractError),
    /// Extraction and chunking produced nothing to index.
    #[error("document contains no extractable text")]
    EmptyDocument,
    /// Embedding provider failed to produce vectors.
    #[error("{0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Chat provider failed to condense or answer.
    #[error("{0}")]
    Generation(#[from] ChatClientError),
    /// Vectors could not be assembled into an index.
    #[error("failed to build index: {0}")]
    Index(#[from] super::index::IndexError),
    /// A blocking extraction task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Closed set of failures returned by the document Q&A service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// File extension does not map to a known extractor.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// Upload request carried no file part.
    #[error("No file was provided")]
    MissingFile,
    /// Question was empty or whitespace only.
    #[error("Question cannot be empty")]
    EmptyQuestion,
    /// `ask` was called before any document was indexed.
    #[error("No document has been uploaded yet")]
    NotReady,
    /// Any provider, extraction, or index failure.
    #[error("Internal Server Error: {0}")]
    Internal(#[from] InternalError),
}

impl From<EmbeddingClientError> for ServiceError {
    fn from(error: EmbeddingClientError) -> Self {
        Self::Internal(error.into())
    }
}

impl From<ChatClientError> for ServiceError {
    fn from(error: ChatClientError) -> Self {
        Self::Internal(error.into())
    }
}

/// Provenance carried from the extractor onto every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMetadata {
    /// Original client-supplied filename.
    pub source: String,
    /// Zero-based record index for tabular sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// Zero-based page index for paginated sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

/// One extracted text unit (a whole document, one PDF page, or one CSV record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Extracted text.
    pub text: String,
    /// Provenance of this unit.
    pub metadata: SourceMetadata,
}

/// Bounded segment of a source unit used as the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk contents.
    pub text: String,
    /// Provenance copied from the originating unit.
    pub metadata: SourceMetadata,
    /// Character offset of the chunk inside its unit.
    pub start_index: usize,
}

/// Prior exchange supplied by the caller as conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Question asked in a previous turn.
    pub question: String,
    /// Answer returned for it.
    pub answer: String,
}

/// Answer returned by [`crate::processing::DocumentQaApi::ask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Generated answer text.
    pub answer: String,
    /// Retrieved chunk texts, best match first.
    pub context: Vec<String>,
}

/// Summary of a processed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Original filename of the processed document.
    pub document: String,
    /// Units produced by the extractor.
    pub unit_count: usize,
    /// Chunks embedded into the new index.
    pub chunk_count: usize,
    /// Version assigned to the resulting session snapshot.
    pub version: u64,
    /// `false` when a newer upload was installed first and this result was discarded.
    pub installed: bool,
}

/// Read-only view of the live session, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Filename of the indexed document.
    pub document: String,
    /// Chunks held by the live index.
    pub chunk_count: usize,
    /// Version of the live snapshot.
    pub version: u64,
}

/// Failures while assembling the service at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The staging directory could not be created.
    #[error("failed to create upload directory {path}: {source}")]
    UploadDir {
        /// Directory that was requested.
        path: std::path::PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Chunk size and overlap are inconsistent.
    #[error(transparent)]
    Chunking(#[from] super::chunking::ChunkingError),
    /// The embedding provider could not be configured.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The chat provider could not be configured.
    #[error(transparent)]
    Chat(#[from] ChatClientError),
}
