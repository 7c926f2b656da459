//! Blob storage capability used to archive original uploads.

mod azure;

pub use azure::{AzureBlobStore, StorageConnection};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned while archiving blobs.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Connection string could not be interpreted.
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),
    /// Blob name is empty or cannot be placed in a URL.
    #[error("Invalid blob name: {0:?}")]
    InvalidBlobName(String),
    /// Request signing failed.
    #[error("Failed to sign storage request: {0}")]
    Signing(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Storage service responded with an unexpected status code.
    #[error("Unexpected storage response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Durable object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` as `blob_name` inside `container`, replacing any existing blob.
    async fn upload(
        &self,
        container: &str,
        blob_name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobError>;
}
