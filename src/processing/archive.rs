//! Optional archiving of original uploads.

use super::{
    backends::Backends,
    types::{ArchiveError, UploadRequest, ValidationError},
};
use crate::config::Config;

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Where uploads are archived. Exists only when both storage settings are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    /// Storage account connection string.
    pub connection_string: String,
    /// Container receiving the blobs.
    pub container: String,
}

impl ArchiveTarget {
    /// Resolve the archive target; `None` disables archiving.
    pub fn from_config(config: &Config) -> Option<Self> {
        let connection_string = non_blank(config.storage_connection_string.as_deref())?;
        let container = non_blank(config.storage_container_name.as_deref())?;
        Some(Self {
            connection_string: connection_string.to_string(),
            container: container.to_string(),
        })
    }

    /// Fail early when the upload cannot be archived under a name.
    pub fn check(&self, upload: &UploadRequest) -> Result<(), ValidationError> {
        upload
            .declared_name()
            .map(|_| ())
            .ok_or(ValidationError::MissingFileName)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Upload the original bytes under the declared filename.
pub async fn archive_upload(
    backends: &dyn Backends,
    target: &ArchiveTarget,
    upload: &UploadRequest,
) -> Result<(), ArchiveError> {
    let Some(blob_name) = upload.declared_name() else {
        return Err(ArchiveError::Blob(crate::blob::BlobError::InvalidBlobName(
            String::new(),
        )));
    };
    let store = backends.blob_store(target)?;
    let content_type = upload.content_type.as_deref().unwrap_or(PDF_CONTENT_TYPE);
    store
        .upload(
            &target.container,
            blob_name,
            upload.file_bytes.clone(),
            Some(content_type),
        )
        .await?;
    tracing::info!(container = %target.container, blob = blob_name, "Upload archived");
    Ok(())
}
