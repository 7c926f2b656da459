//! Embedding and vector-store writes, in one of two deployment modes.
//!
//! The mode is a pure function of configuration and is resolved for every request. Managed mode
//! embeds through Azure OpenAI, writes into pgvector and then builds an IVFFlat index; local mode
//! embeds through Ollama and appends to the file-backed store, which needs no index build.
//! Neither mode rolls back writes that landed before a failure.

use super::{
    backends::Backends,
    types::{Chunk, IndexingError},
};
use crate::{
    config::Config,
    embedding::EmbeddingClient,
    vector_store::{IndexConfig, ManagedVectorStore, VectorRecord, VectorStore},
};

/// Backend family used to index a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Azure OpenAI embeddings and a pgvector store.
    Managed,
    /// Ollama embeddings and the local file store.
    Local,
}

impl DeploymentMode {
    /// Managed when an Azure OpenAI endpoint is configured, local otherwise.
    pub fn from_config(config: &Config) -> Self {
        let managed = config
            .azure_openai_endpoint
            .as_deref()
            .is_some_and(|endpoint| !endpoint.trim().is_empty());
        if managed { Self::Managed } else { Self::Local }
    }

    /// Lowercase label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Local => "local",
        }
    }
}

/// Managed-mode indexing: embed, write, build the similarity index, close.
pub struct ManagedIndexing {
    embedder: Box<dyn EmbeddingClient>,
    index: IndexConfig,
    batch_size: usize,
}

/// Local-mode indexing: embed, write, close.
pub struct LocalIndexing {
    embedder: Box<dyn EmbeddingClient>,
    batch_size: usize,
}

/// The indexing strategy chosen for one request.
pub enum IndexingPlan {
    /// See [`ManagedIndexing`].
    Managed(ManagedIndexing),
    /// See [`LocalIndexing`].
    Local(LocalIndexing),
}

impl IndexingPlan {
    /// Build the strategy for `mode`, acquiring only that mode's embedding client.
    pub fn select(
        mode: DeploymentMode,
        backends: &dyn Backends,
        batch_size: usize,
    ) -> Result<Self, IndexingError> {
        let batch_size = batch_size.max(1);
        Ok(match mode {
            DeploymentMode::Managed => Self::Managed(ManagedIndexing {
                embedder: backends.managed_embedder()?,
                index: IndexConfig::MANAGED,
                batch_size,
            }),
            DeploymentMode::Local => Self::Local(LocalIndexing {
                embedder: backends.local_embedder()?,
                batch_size,
            }),
        })
    }

    /// Mode this plan runs in.
    pub fn mode(&self) -> DeploymentMode {
        match self {
            Self::Managed(_) => DeploymentMode::Managed,
            Self::Local(_) => DeploymentMode::Local,
        }
    }

    /// Index every chunk, returning the number of records written.
    pub async fn run(
        self,
        chunks: Vec<Chunk>,
        backends: &dyn Backends,
    ) -> Result<usize, IndexingError> {
        match self {
            Self::Managed(plan) => plan.run(chunks, backends).await,
            Self::Local(plan) => plan.run(chunks, backends).await,
        }
    }
}

impl ManagedIndexing {
    async fn run(
        self,
        chunks: Vec<Chunk>,
        backends: &dyn Backends,
    ) -> Result<usize, IndexingError> {
        let vectors = embed_chunks(self.embedder.as_ref(), &chunks, self.batch_size).await?;
        if let Some(vector) = vectors
            .iter()
            .find(|vector| vector.len() != self.index.dimensions)
        {
            return Err(IndexingError::DimensionMismatch {
                expected: self.index.dimensions,
                actual: vector.len(),
            });
        }
        let records = into_records(chunks, vectors)?;
        let count = records.len();

        let mut store = backends.managed_store().await?;
        let outcome = write_and_index(store.as_mut(), records, self.index).await;
        let closed = store.close().await;
        finish(outcome, closed)?;

        tracing::info!(
            records = count,
            lists = self.index.lists,
            dimensions = self.index.dimensions,
            similarity = ?self.index.similarity,
            "Managed indexing complete"
        );
        Ok(count)
    }
}

impl LocalIndexing {
    async fn run(
        self,
        chunks: Vec<Chunk>,
        backends: &dyn Backends,
    ) -> Result<usize, IndexingError> {
        let vectors = embed_chunks(self.embedder.as_ref(), &chunks, self.batch_size).await?;
        let records = into_records(chunks, vectors)?;
        let count = records.len();

        let mut store = backends.local_store().await?;
        let outcome = store.write_many(records).await;
        let closed = store.close().await;
        finish(outcome, closed)?;

        tracing::info!(records = count, "Local indexing complete");
        Ok(count)
    }
}

async fn write_and_index(
    store: &mut dyn ManagedVectorStore,
    records: Vec<VectorRecord>,
    index: IndexConfig,
) -> Result<(), crate::vector_store::VectorStoreError> {
    store.write_many(records).await?;
    store.build_index(index).await
}

/// Merge the pipeline result with the close result; the pipeline error wins.
fn finish(
    outcome: Result<(), crate::vector_store::VectorStoreError>,
    closed: Result<(), crate::vector_store::VectorStoreError>,
) -> Result<(), IndexingError> {
    match (outcome, closed) {
        (Err(error), Err(close_error)) => {
            tracing::warn!(error = %close_error, "Vector store close failed after error");
            Err(error.into())
        }
        (Err(error), Ok(())) => Err(error.into()),
        (Ok(()), Err(close_error)) => Err(close_error.into()),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Embed each chunk exactly once, in order, `batch_size` texts per request.
async fn embed_chunks(
    embedder: &dyn EmbeddingClient,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, IndexingError> {
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let embedded = embedder.generate_embeddings(texts).await?;
        if embedded.len() != batch.len() {
            return Err(IndexingError::EmbeddingCountMismatch {
                expected: batch.len(),
                actual: embedded.len(),
            });
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

fn into_records(
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<VectorRecord>, IndexingError> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            Ok(VectorRecord {
                vector,
                metadata: serde_json::to_value(&chunk.metadata)?,
                text: chunk.text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::testing::{Event, RecordingBackends, chunks_of};
    use crate::vector_store::Similarity;

    #[test]
    fn mode_follows_endpoint_presence() {
        let mut config = Config::default();
        assert_eq!(DeploymentMode::from_config(&config), DeploymentMode::Local);

        config.azure_openai_endpoint = Some("   ".into());
        assert_eq!(DeploymentMode::from_config(&config), DeploymentMode::Local);

        config.azure_openai_endpoint = Some("https://example.openai.azure.com".into());
        assert_eq!(DeploymentMode::from_config(&config), DeploymentMode::Managed);
        assert_eq!(DeploymentMode::Managed.as_str(), "managed");
    }

    #[tokio::test]
    async fn managed_plan_writes_builds_index_and_closes() {
        let backends = RecordingBackends::new(1536);
        let plan = IndexingPlan::select(DeploymentMode::Managed, &backends, 2).expect("plan");
        assert_eq!(plan.mode(), DeploymentMode::Managed);

        let written = plan.run(chunks_of(&["a", "b", "c"]), &backends).await.expect("run");

        assert_eq!(written, 3);
        assert_eq!(
            backends.events(),
            vec![
                Event::ManagedEmbed(vec!["a".into(), "b".into()]),
                Event::ManagedEmbed(vec!["c".into()]),
                Event::ManagedWrite(vec!["a".into(), "b".into(), "c".into()]),
                Event::BuildIndex(IndexConfig {
                    lists: 100,
                    dimensions: 1536,
                    similarity: Similarity::Cosine,
                }),
                Event::ManagedClose,
            ]
        );
    }

    #[tokio::test]
    async fn local_plan_never_touches_managed_backends() {
        let backends = RecordingBackends::new(8);
        let plan = IndexingPlan::select(DeploymentMode::Local, &backends, 16).expect("plan");

        plan.run(chunks_of(&["a", "b"]), &backends).await.expect("run");

        assert_eq!(
            backends.events(),
            vec![
                Event::LocalEmbed(vec!["a".into(), "b".into()]),
                Event::LocalWrite(vec!["a".into(), "b".into()]),
                Event::LocalClose,
            ]
        );
    }

    #[tokio::test]
    async fn managed_store_is_closed_after_failed_write() {
        let backends = RecordingBackends::new(1536).failing_write();
        let plan = IndexingPlan::select(DeploymentMode::Managed, &backends, 16).expect("plan");

        let error = plan.run(chunks_of(&["a"]), &backends).await.expect_err("write fails");

        assert!(matches!(error, IndexingError::Store(_)));
        let events = backends.events();
        assert!(!events.iter().any(|event| matches!(event, Event::BuildIndex(_))));
        assert_eq!(events.last(), Some(&Event::ManagedClose));
    }

    #[tokio::test]
    async fn managed_store_is_closed_after_failed_index_build() {
        let backends = RecordingBackends::new(1536).failing_index();
        let plan = IndexingPlan::select(DeploymentMode::Managed, &backends, 16).expect("plan");

        let error = plan.run(chunks_of(&["a"]), &backends).await.expect_err("index fails");

        assert!(matches!(error, IndexingError::Store(_)));
        assert_eq!(backends.events().last(), Some(&Event::ManagedClose));
        assert_eq!(backends.stored_records(), 1, "partial writes are kept");
    }

    #[tokio::test]
    async fn wrong_dimension_fails_before_connecting() {
        let backends = RecordingBackends::new(3);
        let plan = IndexingPlan::select(DeploymentMode::Managed, &backends, 16).expect("plan");

        let error = plan.run(chunks_of(&["a"]), &backends).await.expect_err("dimension");

        assert!(matches!(
            error,
            IndexingError::DimensionMismatch { expected: 1536, actual: 3 }
        ));
        assert!(!backends.events().contains(&Event::ManagedClose));
    }

    #[tokio::test]
    async fn embedding_failure_stops_before_store() {
        let backends = RecordingBackends::new(8).failing_embedding();
        let plan = IndexingPlan::select(DeploymentMode::Local, &backends, 16).expect("plan");

        let error = plan.run(chunks_of(&["a"]), &backends).await.expect_err("embed");

        assert!(matches!(error, IndexingError::Embedding(_)));
        assert!(!backends.events().contains(&Event::LocalClose));
    }

    #[tokio::test]
    async fn records_carry_chunk_metadata() {
        let backends = RecordingBackends::new(8);
        let plan = IndexingPlan::select(DeploymentMode::Local, &backends, 16).expect("plan");

        plan.run(chunks_of(&["a", "b"]), &backends).await.expect("run");

        let records = backends.records();
        assert_eq!(records[1].metadata["chunk_index"], 1);
        assert_eq!(records[1].metadata["source"], "report.pdf");
        assert_eq!(records[1].vector.len(), 8);
    }
}
