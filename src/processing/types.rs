//! Core data types and error definitions for the ingestion pipeline.

use crate::{
    blob::BlobError, embedding::EmbeddingClientError, processing::indexer::DeploymentMode,
    vector_store::VectorStoreError,
};
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Source name recorded when the upload did not declare a filename.
pub const UNNAMED_SOURCE: &str = "blob";

/// Problems with the incoming request itself. Reported to callers as client errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Multipart body had no `file` part.
    #[error("\"file\" field not found in form data.")]
    MissingFile,
    /// `file` part was present but empty.
    #[error("\"file\" field is empty.")]
    EmptyFile,
    /// Archiving is enabled but no filename was supplied.
    #[error("\"filename\" field is required when archiving is enabled.")]
    MissingFileName,
    /// Request body exceeded the configured upload limit.
    #[error("Upload exceeds the maximum allowed size.")]
    PayloadTooLarge,
    /// Body could not be decoded as multipart form data.
    #[error("Malformed form data: {0}")]
    MalformedForm(String),
}

/// Errors raised while turning uploaded bytes into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Bytes are not a readable PDF.
    #[error("Failed to parse PDF: {0}")]
    Unparseable(String),
    /// The parser crashed on the input.
    #[error("PDF parser aborted: {0}")]
    ParserPanicked(String),
    /// PDF parsed but contained no text.
    #[error("Document contains no extractable text")]
    NoText,
}

/// Invalid splitter parameters.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new content in every window.
    #[error("chunk overlap {overlap} must be smaller than chunk size {size}")]
    InvalidOverlap {
        /// Configured chunk size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Errors raised while embedding chunks or writing them to a vector store.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// Embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected an operation.
    #[error("Vector store operation failed: {0}")]
    Store(#[from] VectorStoreError),
    /// Provider returned a different number of vectors than texts submitted.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Provider returned vectors of the wrong size for the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension required by the index.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// Chunk metadata could not be encoded.
    #[error("Failed to encode chunk metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Errors raised while archiving the original upload.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Blob storage rejected the upload or was unreachable.
    #[error("Failed to archive upload: {0}")]
    Blob(#[from] BlobError),
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// PDF extraction failed.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Embedding or vector store writes failed.
    #[error("Indexing failed: {0}")]
    Indexing(#[from] IndexingError),
    /// Blob upload failed after indexing.
    #[error("Archiving failed: {0}")]
    Archive(#[from] ArchiveError),
}

impl PipelineError {
    /// Whether the caller is at fault (400) rather than a downstream service (503).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// A decoded upload: the file payload and the name it should be archived under.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Raw file content.
    pub file_bytes: Bytes,
    /// Declared filename, if any.
    pub file_name: Option<String>,
    /// MIME type announced by the client for the file part.
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Build an upload, rejecting empty payloads. Blank names are treated as absent.
    pub fn new(
        file_bytes: Bytes,
        file_name: Option<String>,
        content_type: Option<String>,
    ) -> Result<Self, ValidationError> {
        if file_bytes.is_empty() {
            return Err(ValidationError::EmptyFile);
        }
        Ok(Self {
            file_bytes,
            file_name: file_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            content_type,
        })
    }

    /// Declared filename, when one was supplied.
    pub fn declared_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

/// Provenance shared by a document and all of its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Declared filename, or [`UNNAMED_SOURCE`].
    pub source: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub content_hash: String,
    /// Size of the uploaded file in bytes.
    pub byte_len: usize,
}

impl DocumentMetadata {
    /// Derive metadata from an upload.
    pub fn for_upload(upload: &UploadRequest) -> Self {
        Self {
            source: upload
                .declared_name()
                .unwrap_or(UNNAMED_SOURCE)
                .to_string(),
            content_hash: hex::encode(Sha256::digest(&upload.file_bytes)),
            byte_len: upload.file_bytes.len(),
        }
    }
}

/// Full text of an uploaded document.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Concatenated text of every page.
    pub text: String,
    /// Where the text came from.
    pub metadata: DocumentMetadata,
}

/// Metadata persisted with every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// Originating filename.
    pub source: String,
    /// Hash of the originating file.
    pub content_hash: String,
    /// Position of the chunk within the document.
    pub chunk_index: usize,
    /// Character offset of the chunk's first character.
    pub char_start: usize,
    /// Chunk length in characters.
    pub char_len: usize,
}

/// Bounded window of document text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Window text.
    pub text: String,
    /// Provenance of the window.
    pub metadata: ChunkMetadata,
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Backend family that indexed the document.
    pub mode: DeploymentMode,
    /// Number of chunks written to the vector store.
    pub chunk_count: usize,
    /// Whether the original file was archived.
    pub archived: bool,
}
