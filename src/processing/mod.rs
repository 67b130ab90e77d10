//! Document pipeline: extraction, chunking, indexing, answering, and session state.

pub mod chunking;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod sanitize;
mod service;
pub mod session;
pub mod types;

pub use service::{DocumentQaApi, DocumentQaService, ServiceSettings};
pub use types::{
    Answer, ConversationTurn, InternalError, ServiceError, SessionStatus, StartupError,
    UploadOutcome,
};
