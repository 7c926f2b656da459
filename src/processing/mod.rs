//! Document ingestion pipeline: extraction, chunking, indexing and archiving.

pub mod archive;
pub mod backends;
pub mod chunking;
pub mod extract;
#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
mod fixtures;
pub mod indexer;
mod service;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use backends::{Backends, ConfiguredBackends};
pub use indexer::{DeploymentMode, IndexingPlan};
pub use service::{IngestionApi, IngestionService};
pub use types::{
    ArchiveError, Chunk, ChunkMetadata, ChunkingError, DocumentMetadata, ExtractionError,
    IndexingError, IngestOutcome, PipelineError, RawDocument, UploadRequest, ValidationError,
};
