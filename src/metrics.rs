use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload and question activity.
#[derive(Default)]
pub struct QaMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_count: AtomicU64,
    uploads_failed: AtomicU64,
    uploads_superseded: AtomicU64,
    questions_answered: AtomicU64,
    questions_failed: AtomicU64,
}

impl QaMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record an upload that did not produce an index.
    pub fn record_upload_failure(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload whose index was discarded because a newer one was already live.
    pub fn record_superseded(&self) {
        self.uploads_superseded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of an `ask` call.
    pub fn record_question(&self, answered: bool) {
        let counter = if answered {
            &self.questions_answered
        } else {
            &self.questions_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let documents_indexed = self.documents_indexed.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_indexed,
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_count: (documents_indexed > 0)
                .then(|| self.last_chunk_count.load(Ordering::Relaxed)),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            uploads_superseded: self.uploads_superseded.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            questions_failed: self.questions_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents indexed since startup.
    pub documents_indexed: u64,
    /// Total chunk count produced across all indexed documents.
    pub chunks_indexed: u64,
    /// Chunk count of the most recently indexed document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
    /// Uploads rejected or failed during processing.
    pub uploads_failed: u64,
    /// Uploads that finished after a newer document was installed.
    pub uploads_superseded: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Questions that ended in an error.
    pub questions_failed: u64,
}
