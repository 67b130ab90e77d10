#![deny(missing_docs)]

//! Core library for the document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Password login and bearer-token validation.
pub mod auth;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Chat-completion client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and question metrics helpers.
pub mod metrics;
/// Document pipeline: extraction, chunking, indexing, and answering.
pub mod processing;
