use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    documents_archived: AtomicU64,
    failed_requests: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully ingested document.
    pub fn record_document(&self, chunk_count: u64, archived: bool) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        if archived {
            self.documents_archived.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an upload that did not complete.
    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            documents_archived: self.documents_archived.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents fully ingested since startup.
    pub documents_ingested: u64,
    /// Total chunks written across all ingested documents.
    pub chunks_indexed: u64,
    /// Documents whose original file was archived.
    pub documents_archived: u64,
    /// Uploads that failed inside the ingestion pipeline.
    pub failed_requests: u64,
}
