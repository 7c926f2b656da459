//! Per-request construction of the external capabilities the pipeline drives.

use crate::{
    blob::{AzureBlobStore, BlobStore},
    config::{Config, require},
    embedding::{AzureOpenAiEmbeddings, EmbeddingClient, OllamaEmbeddings},
    processing::{
        archive::ArchiveTarget,
        types::{ArchiveError, IndexingError},
    },
    vector_store::{
        IndexConfig, LocalVectorStore, ManagedVectorStore, PgVectorStore, VectorStore,
        VectorStoreError,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Factory for embedding, vector store and blob handles.
///
/// Every request asks for fresh handles and drops them when it finishes; nothing is pooled.
#[async_trait]
pub trait Backends: Send + Sync {
    /// Embedding client for managed deployments.
    fn managed_embedder(&self) -> Result<Box<dyn EmbeddingClient>, IndexingError>;

    /// Open a connection to the managed vector store.
    async fn managed_store(&self) -> Result<Box<dyn ManagedVectorStore>, IndexingError>;

    /// Embedding client for local deployments.
    fn local_embedder(&self) -> Result<Box<dyn EmbeddingClient>, IndexingError>;

    /// Open the local vector store.
    async fn local_store(&self) -> Result<Box<dyn VectorStore>, IndexingError>;

    /// Blob client for the archive target.
    fn blob_store(&self, target: &ArchiveTarget) -> Result<Box<dyn BlobStore>, ArchiveError>;
}

/// Production backends built from the process configuration.
pub struct ConfiguredBackends {
    config: Arc<Config>,
}

impl ConfiguredBackends {
    /// Wrap the configuration used to build each handle.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Backends for ConfiguredBackends {
    fn managed_embedder(&self) -> Result<Box<dyn EmbeddingClient>, IndexingError> {
        Ok(Box::new(AzureOpenAiEmbeddings::from_config(&self.config)?))
    }

    async fn managed_store(&self) -> Result<Box<dyn ManagedVectorStore>, IndexingError> {
        let connection_string = require(
            self.config.pgvector_connection_string.as_deref(),
            "AZURE_PGVECTOR_CONNECTION_STRING",
        )
        .map_err(VectorStoreError::from)?;
        let store = PgVectorStore::connect(
            &connection_string,
            &self.config.pgvector_table,
            IndexConfig::MANAGED.dimensions,
        )
        .await?;
        Ok(Box::new(store))
    }

    fn local_embedder(&self) -> Result<Box<dyn EmbeddingClient>, IndexingError> {
        Ok(Box::new(OllamaEmbeddings::from_config(&self.config)?))
    }

    async fn local_store(&self) -> Result<Box<dyn VectorStore>, IndexingError> {
        let store = LocalVectorStore::open(&self.config.local_vector_store_dir).await?;
        Ok(Box::new(store))
    }

    fn blob_store(&self, target: &ArchiveTarget) -> Result<Box<dyn BlobStore>, ArchiveError> {
        Ok(Box::new(AzureBlobStore::from_connection_string(
            &target.connection_string,
        )?))
    }
}
