//! Vector store capabilities and their adapters.
//!
//! Managed deployments write into Postgres with the pgvector extension and build an IVFFlat
//! index after each batch. Local deployments append records to a JSONL file on disk; the file
//! itself is the index.

mod local;
mod postgres;

pub use local::{LocalVectorStore, StoredRecord};
pub use postgres::PgVectorStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by vector store adapters.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Store settings were incomplete.
    #[error("Vector store not configured: {0}")]
    Configuration(#[from] crate::config::ConfigError),
    /// Postgres rejected a statement or the connection failed.
    #[error("Postgres request failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// Local store file could not be read or written.
    #[error("Local store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Record could not be encoded or decoded.
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Index or record dimension disagrees with the store layout.
    #[error("Vector dimension mismatch: store uses {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the store was created with.
        expected: usize,
        /// Dimension supplied by the caller.
        actual: usize,
    },
    /// Operation attempted after `close`.
    #[error("Vector store connection already closed")]
    Closed,
}

/// One embedded chunk ready to persist. The store assigns its own identity.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Embedding of `text`.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub text: String,
    /// Source metadata stored alongside the vector.
    pub metadata: Value,
}

/// Distance function used by a similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Similarity {
    /// Cosine distance.
    Cosine,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Negative inner product.
    InnerProduct,
}

impl Similarity {
    /// pgvector operator class implementing this distance.
    pub fn operator_class(self) -> &'static str {
        match self {
            Self::Cosine => "vector_cosine_ops",
            Self::Euclidean => "vector_l2_ops",
            Self::InnerProduct => "vector_ip_ops",
        }
    }
}

/// Parameters for an inverted-file similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Number of inverted lists (clusters).
    pub lists: usize,
    /// Vector dimension covered by the index.
    pub dimensions: usize,
    /// Distance function.
    pub similarity: Similarity,
}

impl IndexConfig {
    /// Layout used for every managed store.
    pub const MANAGED: Self = Self {
        lists: 100,
        dimensions: 1536,
        similarity: Similarity::Cosine,
    };
}

/// Persistence capability shared by every vector store.
#[async_trait]
pub trait VectorStore: Send {
    /// Persist all records. Earlier writes are kept if a later one fails.
    async fn write_many(&mut self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError>;

    /// Release the underlying connection or file handle.
    async fn close(&mut self) -> Result<(), VectorStoreError>;
}

/// Vector store that needs an explicit index build after writes.
#[async_trait]
pub trait ManagedVectorStore: VectorStore {
    /// Build (or confirm) the similarity index over stored vectors.
    async fn build_index(&mut self, config: IndexConfig) -> Result<(), VectorStoreError>;
}
