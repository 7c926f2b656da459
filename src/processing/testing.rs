//! Recording doubles for the pipeline's external capabilities.

use super::{
    archive::ArchiveTarget,
    backends::Backends,
    extract::DocumentExtractor,
    types::{
        ArchiveError, Chunk, ChunkMetadata, DocumentMetadata, ExtractionError, IndexingError,
        RawDocument, UploadRequest,
    },
};
use crate::{
    blob::{BlobError, BlobStore},
    embedding::{EmbeddingClient, EmbeddingClientError},
    vector_store::{IndexConfig, ManagedVectorStore, VectorRecord, VectorStore, VectorStoreError},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};

/// Observable side effect, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    ManagedEmbed(Vec<String>),
    LocalEmbed(Vec<String>),
    ManagedWrite(Vec<String>),
    LocalWrite(Vec<String>),
    BuildIndex(IndexConfig),
    ManagedClose,
    LocalClose,
    Archive {
        container: String,
        blob: String,
        bytes: usize,
        content_type: Option<String>,
    },
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    records: Vec<VectorRecord>,
}

#[derive(Default, Clone, Copy)]
struct Faults {
    embedding: bool,
    write: bool,
    index: bool,
    archive: bool,
}

#[derive(Clone, Copy)]
enum Side {
    Managed,
    Local,
}

/// Backends that record every call instead of reaching the network.
#[derive(Clone)]
pub(crate) struct RecordingBackends {
    state: Arc<Mutex<State>>,
    dimensions: usize,
    faults: Faults,
}

impl RecordingBackends {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            state: Arc::default(),
            dimensions,
            faults: Faults::default(),
        }
    }

    pub(crate) fn failing_embedding(mut self) -> Self {
        self.faults.embedding = true;
        self
    }

    pub(crate) fn failing_write(mut self) -> Self {
        self.faults.write = true;
        self
    }

    pub(crate) fn failing_index(mut self) -> Self {
        self.faults.index = true;
        self
    }

    pub(crate) fn failing_archive(mut self) -> Self {
        self.faults.archive = true;
        self
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.state.lock().expect("state lock").events.clone()
    }

    pub(crate) fn records(&self) -> Vec<VectorRecord> {
        self.state.lock().expect("state lock").records.clone()
    }

    pub(crate) fn stored_records(&self) -> usize {
        self.state.lock().expect("state lock").records.len()
    }

    fn push(&self, event: Event) {
        self.state.lock().expect("state lock").events.push(event);
    }

    fn embedder(&self, side: Side) -> Box<dyn EmbeddingClient> {
        Box::new(RecordingEmbedder {
            backends: self.clone(),
            side,
        })
    }

    fn store(&self, side: Side) -> RecordingStore {
        RecordingStore {
            backends: self.clone(),
            side,
        }
    }
}

#[async_trait]
impl Backends for RecordingBackends {
    fn managed_embedder(&self) -> Result<Box<dyn EmbeddingClient>, IndexingError> {
        Ok(self.embedder(Side::Managed))
    }

    async fn managed_store(&self) -> Result<Box<dyn ManagedVectorStore>, IndexingError> {
        Ok(Box::new(self.store(Side::Managed)))
    }

    fn local_embedder(&self) -> Result<Box<dyn EmbeddingClient>, IndexingError> {
        Ok(self.embedder(Side::Local))
    }

    async fn local_store(&self) -> Result<Box<dyn VectorStore>, IndexingError> {
        Ok(Box::new(self.store(Side::Local)))
    }

    fn blob_store(&self, _target: &ArchiveTarget) -> Result<Box<dyn BlobStore>, ArchiveError> {
        Ok(Box::new(RecordingBlobs {
            backends: self.clone(),
        }))
    }
}

struct RecordingEmbedder {
    backends: RecordingBackends,
    side: Side,
}

#[async_trait]
impl EmbeddingClient for RecordingEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.backends.faults.embedding {
            return Err(EmbeddingClientError::ProviderUnavailable(
                "connection refused".into(),
            ));
        }
        let count = texts.len();
        self.backends.push(match self.side {
            Side::Managed => Event::ManagedEmbed(texts),
            Side::Local => Event::LocalEmbed(texts),
        });
        Ok(vec![vec![0.5; self.backends.dimensions]; count])
    }
}

struct RecordingStore {
    backends: RecordingBackends,
    side: Side,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn write_many(&mut self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        if self.backends.faults.write {
            return Err(VectorStoreError::Io(std::io::Error::other("write refused")));
        }
        let texts = records.iter().map(|record| record.text.clone()).collect();
        self.backends.push(match self.side {
            Side::Managed => Event::ManagedWrite(texts),
            Side::Local => Event::LocalWrite(texts),
        });
        self.backends
            .state
            .lock()
            .expect("state lock")
            .records
            .extend(records);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VectorStoreError> {
        self.backends.push(match self.side {
            Side::Managed => Event::ManagedClose,
            Side::Local => Event::LocalClose,
        });
        Ok(())
    }
}

#[async_trait]
impl ManagedVectorStore for RecordingStore {
    async fn build_index(&mut self, config: IndexConfig) -> Result<(), VectorStoreError> {
        if self.backends.faults.index {
            return Err(VectorStoreError::Io(std::io::Error::other("index build refused")));
        }
        self.backends.push(Event::BuildIndex(config));
        Ok(())
    }
}

struct RecordingBlobs {
    backends: RecordingBackends,
}

#[async_trait]
impl BlobStore for RecordingBlobs {
    async fn upload(
        &self,
        container: &str,
        blob_name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        if self.backends.faults.archive {
            return Err(BlobError::UnexpectedStatus {
                status: StatusCode::FORBIDDEN,
                body: "AuthorizationFailure".into(),
            });
        }
        self.backends.push(Event::Archive {
            container: container.to_string(),
            blob: blob_name.to_string(),
            bytes: bytes.len(),
            content_type: content_type.map(str::to_string),
        });
        Ok(())
    }
}

/// Treats uploaded bytes as UTF-8 text, optionally failing every call.
#[derive(Default)]
pub(crate) struct PlainTextExtractor {
    pub(crate) fail: bool,
    pub(crate) calls: Mutex<usize>,
}

impl PlainTextExtractor {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract(&self, upload: &UploadRequest) -> Result<RawDocument, ExtractionError> {
        *self.calls.lock().expect("calls lock") += 1;
        if self.fail {
            return Err(ExtractionError::Unparseable(
                "invalid cross-reference table at offset 0x1f".into(),
            ));
        }
        Ok(RawDocument {
            text: String::from_utf8_lossy(&upload.file_bytes).into_owned(),
            metadata: DocumentMetadata::for_upload(upload),
        })
    }
}

/// Chunks of `report.pdf` with the given texts.
pub(crate) fn chunks_of(texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "report.pdf".into(),
                content_hash: "hash".into(),
                chunk_index,
                char_start: 0,
                char_len: text.chars().count(),
            },
        })
        .collect()
}
