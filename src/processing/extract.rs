//! PDF text extraction.

use super::types::{DocumentMetadata, ExtractionError, RawDocument, UploadRequest};
use async_trait::async_trait;

/// Turns uploaded bytes into a single text document.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract the full text of `upload`.
    async fn extract(&self, upload: &UploadRequest) -> Result<RawDocument, ExtractionError>;
}

/// Whole-document PDF extraction backed by `pdf-extract`. Page boundaries are not kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract(&self, upload: &UploadRequest) -> Result<RawDocument, ExtractionError> {
        extract_document(upload).await
    }
}

/// Extract the full text of a PDF upload on the blocking pool.
pub async fn extract_document(upload: &UploadRequest) -> Result<RawDocument, ExtractionError> {
    let bytes = upload.file_bytes.clone();
    // Parsing is CPU-bound and may panic on hostile input.
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|error| ExtractionError::ParserPanicked(error.to_string()))?
        .map_err(|error| ExtractionError::Unparseable(error.to_string()))?;

    if text.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }

    let metadata = DocumentMetadata::for_upload(upload);
    tracing::debug!(
        source = %metadata.source,
        bytes = metadata.byte_len,
        chars = text.chars().count(),
        "Extracted document text"
    );
    Ok(RawDocument { text, metadata })
}
