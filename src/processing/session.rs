//! Live (index, pipeline) pair shared by request handlers.
//!
//! Snapshots are immutable and versioned. Every upload draws a version ticket when it starts;
//! a finished build is installed only if its ticket is newer than the live snapshot's, so the
//! most recently *started* upload wins regardless of which build finishes first. Readers clone
//! the `Arc` of the live snapshot and keep using it even if a newer one is installed mid-request.

use super::index::VectorIndex;
use super::pipeline::AnswerPipeline;
use super::types::SessionStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Fully built index and the pipeline bound to it.
pub struct SessionSnapshot {
    /// Ticket drawn when the upload started.
    pub version: u64,
    /// Original filename of the indexed document.
    pub document: String,
    /// Index queried by `pipeline`.
    pub index: Arc<VectorIndex>,
    /// Answer pipeline bound to `index`.
    pub pipeline: AnswerPipeline,
}

/// Holder of the single active snapshot.
#[derive(Default)]
pub struct SessionState {
    live: RwLock<Option<Arc<SessionSnapshot>>>,
    next_version: AtomicU64,
}

impl SessionState {
    /// Create an empty session; `ask` fails until the first install.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the version ticket for an upload that is starting now.
    pub fn begin_upload(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install `snapshot` unless a snapshot with a newer ticket is already live.
    ///
    /// Returns whether the snapshot became live.
    pub async fn install(&self, snapshot: SessionSnapshot) -> bool {
        let mut live = self.live.write().await;
        if let Some(current) = live.as_ref() {
            if current.version > snapshot.version {
                tracing::warn!(
                    live_version = current.version,
                    stale_version = snapshot.version,
                    document = %snapshot.document,
                    "Discarding index superseded by a newer upload"
                );
                return false;
            }
        }
        tracing::info!(
            version = snapshot.version,
            document = %snapshot.document,
            chunks = snapshot.index.len(),
            "Session index replaced"
        );
        *live = Some(Arc::new(snapshot));
        true
    }

    /// Snapshot live at the time of the call, if any.
    pub async fn current(&self) -> Option<Arc<SessionSnapshot>> {
        self.live.read().await.clone()
    }

    /// Summary of the live snapshot for health reporting.
    pub async fn status(&self) -> Option<SessionStatus> {
        self.current().await.map(|snapshot| SessionStatus {
            document: snapshot.document.clone(),
            chunk_count: snapshot.index.len(),
            version: snapshot.version,
        })
    }
}
