//! Ingestion service coordinating extraction, chunking, indexing and archiving.

use crate::{
    config::Config,
    metrics::{IngestMetrics, MetricsSnapshot},
    processing::{
        archive::{ArchiveTarget, archive_upload},
        backends::Backends,
        chunking::TextSplitter,
        extract::{DocumentExtractor, PdfExtractor},
        indexer::{DeploymentMode, IndexingPlan},
        types::{ChunkingError, IngestOutcome, PipelineError, UploadRequest},
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs the full upload pipeline: extract, split, index, then archive.
///
/// Configuration is captured once at construction, but the deployment mode and archive target
/// are resolved from it on every request and all backend handles are built per request. Steps run
/// strictly in sequence and the first failure aborts the rest; nothing already written is undone.
pub struct IngestionService {
    config: Arc<Config>,
    backends: Arc<dyn Backends>,
    extractor: Arc<dyn DocumentExtractor>,
    splitter: TextSplitter,
    metrics: Arc<IngestMetrics>,
}

/// Abstraction over the ingestion pipeline used by the HTTP surface.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Ingest one uploaded document.
    async fn ingest(&self, upload: UploadRequest) -> Result<IngestOutcome, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl IngestionService {
    /// Build a service extracting PDFs with [`PdfExtractor`].
    pub fn new(config: Arc<Config>, backends: Arc<dyn Backends>) -> Result<Self, ChunkingError> {
        let splitter = TextSplitter::from_config(&config)?;
        tracing::debug!(
            chunk_size = splitter.chunk_size(),
            chunk_overlap = splitter.chunk_overlap(),
            batch_size = config.embedding_batch_size,
            "Ingestion service ready"
        );
        Ok(Self {
            config,
            backends,
            extractor: Arc::new(PdfExtractor),
            splitter,
            metrics: Arc::new(IngestMetrics::new()),
        })
    }

    /// Replace the document extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    async fn run(&self, upload: UploadRequest) -> Result<IngestOutcome, PipelineError> {
        let mode = DeploymentMode::from_config(&self.config);
        let archive = ArchiveTarget::from_config(&self.config);
        if let Some(target) = &archive {
            target.check(&upload)?;
        }

        let document = self.extractor.extract(&upload).await?;
        let chunks = self.splitter.split(&document);
        tracing::debug!(
            source = %document.metadata.source,
            chunks = chunks.len(),
            mode = mode.as_str(),
            "Document split"
        );

        let plan = IndexingPlan::select(
            mode,
            self.backends.as_ref(),
            self.config.embedding_batch_size,
        )?;
        let chunk_count = plan.run(chunks, self.backends.as_ref()).await?;

        let archived = match &archive {
            Some(target) => {
                archive_upload(self.backends.as_ref(), target, &upload).await?;
                true
            }
            None => {
                tracing::debug!("Archiving disabled; skipping blob upload");
                false
            }
        };

        Ok(IngestOutcome {
            mode,
            chunk_count,
            archived,
        })
    }
}

#[async_trait]
impl IngestionApi for IngestionService {
    async fn ingest(&self, upload: UploadRequest) -> Result<IngestOutcome, PipelineError> {
        let source = upload.declared_name().map(str::to_string);
        match self.run(upload).await {
            Ok(outcome) => {
                self.metrics
                    .record_document(outcome.chunk_count as u64, outcome.archived);
                tracing::info!(
                    source = source.as_deref().unwrap_or_default(),
                    mode = outcome.mode.as_str(),
                    chunks = outcome.chunk_count,
                    archived = outcome.archived,
                    "Document ingested"
                );
                Ok(outcome)
            }
            Err(error) => {
                self.metrics.record_failure();
                Err(error)
            }
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{
        testing::{Event, PlainTextExtractor, RecordingBackends},
        types::{ExtractionError, IndexingError, ValidationError},
    };
    use crate::vector_store::{IndexConfig, Similarity};
    use bytes::Bytes;

    fn managed_config() -> Config {
        Config {
            azure_openai_endpoint: Some("https://example.openai.azure.com".into()),
            azure_openai_api_key: Some("key".into()),
            ..Config::default()
        }
    }

    fn with_archive(config: Config) -> Config {
        Config {
            storage_connection_string: Some("UseDevelopmentStorage=true".into()),
            storage_container_name: Some("documents".into()),
            ..config
        }
    }

    fn service(
        config: Config,
        backends: &RecordingBackends,
        extractor: Arc<PlainTextExtractor>,
    ) -> IngestionService {
        IngestionService::new(Arc::new(config), Arc::new(backends.clone()))
            .expect("service")
            .with_extractor(extractor)
    }

    fn upload(text: &str, name: Option<&str>) -> UploadRequest {
        UploadRequest::new(
            Bytes::from(text.to_string()),
            name.map(str::to_string),
            Some("application/pdf".into()),
        )
        .expect("upload")
    }

    #[tokio::test]
    async fn managed_upload_embeds_writes_indexes_and_closes() {
        let backends = RecordingBackends::new(1536);
        let service = service(managed_config(), &backends, Arc::default());
        let text = "x".repeat(2500);

        let outcome = service
            .ingest(upload(&text, Some("report.pdf")))
            .await
            .expect("ingest");

        assert_eq!(outcome.mode, DeploymentMode::Managed);
        assert_eq!(outcome.chunk_count, 3);
        assert!(!outcome.archived);
        let events = backends.events();
        let embedded: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                Event::ManagedEmbed(texts) => Some(texts.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(embedded.len(), 3, "each chunk embedded exactly once");
        assert_eq!(
            &events[events.len() - 3..],
            &[
                Event::ManagedWrite(embedded.clone()),
                Event::BuildIndex(IndexConfig {
                    lists: 100,
                    dimensions: 1536,
                    similarity: Similarity::Cosine,
                }),
                Event::ManagedClose,
            ]
        );
        assert!(!events.iter().any(|event| matches!(
            event,
            Event::LocalEmbed(_) | Event::LocalWrite(_) | Event::LocalClose
        )));
    }

    #[tokio::test]
    async fn local_upload_without_storage_skips_archive() {
        let backends = RecordingBackends::new(768);
        let service = service(Config::default(), &backends, Arc::default());

        let outcome = service
            .ingest(upload("hello world", Some("report.pdf")))
            .await
            .expect("ingest");

        assert_eq!(outcome.mode, DeploymentMode::Local);
        assert!(!outcome.archived);
        assert_eq!(
            backends.events(),
            vec![
                Event::LocalEmbed(vec!["hello world".into()]),
                Event::LocalWrite(vec!["hello world".into()]),
                Event::LocalClose,
            ]
        );
    }

    #[tokio::test]
    async fn configured_archive_receives_original_bytes() {
        let backends = RecordingBackends::new(768);
        let service = service(with_archive(Config::default()), &backends, Arc::default());

        let outcome = service
            .ingest(upload("hello world", Some("report.pdf")))
            .await
            .expect("ingest");

        assert!(outcome.archived);
        assert_eq!(
            backends.events().last(),
            Some(&Event::Archive {
                container: "documents".into(),
                blob: "report.pdf".into(),
                bytes: 11,
                content_type: Some("application/pdf".into()),
            })
        );
        assert_eq!(service.metrics_snapshot().documents_archived, 1);
    }

    #[tokio::test]
    async fn unnamed_upload_is_rejected_before_extraction_when_archiving() {
        let backends = RecordingBackends::new(768);
        let extractor = Arc::new(PlainTextExtractor::default());
        let service = service(with_archive(Config::default()), &backends, extractor.clone());

        let error = service
            .ingest(upload("hello", None))
            .await
            .expect_err("filename required");

        assert!(matches!(
            error,
            PipelineError::Validation(ValidationError::MissingFileName)
        ));
        assert!(error.is_client_error());
        assert_eq!(extractor.calls(), 0);
        assert!(backends.events().is_empty());
    }

    #[tokio::test]
    async fn unnamed_upload_is_accepted_without_archiving() {
        let backends = RecordingBackends::new(768);
        let service = service(Config::default(), &backends, Arc::default());

        service.ingest(upload("hello", None)).await.expect("ingest");

        let records = backends.records();
        assert_eq!(records[0].metadata["source"], "blob");
    }

    #[tokio::test]
    async fn extraction_failure_stops_the_pipeline() {
        let backends = RecordingBackends::new(768);
        let service = service(
            Config::default(),
            &backends,
            Arc::new(PlainTextExtractor::failing()),
        );

        let error = service
            .ingest(upload("hello", Some("report.pdf")))
            .await
            .expect_err("extraction fails");

        assert!(matches!(
            error,
            PipelineError::Extraction(ExtractionError::Unparseable(_))
        ));
        assert!(!error.is_client_error());
        assert!(backends.events().is_empty());
        assert_eq!(service.metrics_snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn indexing_failure_skips_archive() {
        let backends = RecordingBackends::new(1536).failing_write();
        let service = service(with_archive(managed_config()), &backends, Arc::default());

        let error = service
            .ingest(upload("hello", Some("report.pdf")))
            .await
            .expect_err("write fails");

        assert!(matches!(
            error,
            PipelineError::Indexing(IndexingError::Store(_))
        ));
        let events = backends.events();
        assert_eq!(events.last(), Some(&Event::ManagedClose));
        assert!(!events.iter().any(|event| matches!(event, Event::Archive { .. })));
    }

    #[tokio::test]
    async fn archive_failure_keeps_index_writes() {
        let backends = RecordingBackends::new(1536).failing_archive();
        let service = service(with_archive(managed_config()), &backends, Arc::default());

        let error = service
            .ingest(upload("hello", Some("report.pdf")))
            .await
            .expect_err("archive fails");

        assert!(matches!(error, PipelineError::Archive(_)));
        assert_eq!(backends.stored_records(), 1);
        assert!(backends.events().contains(&Event::ManagedClose));
        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_ingested, 0);
        assert_eq!(snapshot.failed_requests, 1);
    }

    #[tokio::test]
    async fn mode_is_resolved_from_configuration_each_time() {
        let managed = RecordingBackends::new(1536);
        service(managed_config(), &managed, Arc::default())
            .ingest(upload("a", Some("a.pdf")))
            .await
            .expect("managed");
        let local = RecordingBackends::new(768);
        service(Config::default(), &local, Arc::default())
            .ingest(upload("a", Some("a.pdf")))
            .await
            .expect("local");

        assert!(managed.events().contains(&Event::ManagedClose));
        assert!(!managed.events().contains(&Event::LocalClose));
        assert!(local.events().contains(&Event::LocalClose));
        assert!(!local.events().contains(&Event::ManagedClose));
    }
}
