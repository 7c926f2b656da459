//! File-backed vector store for local development.

use super::{VectorRecord, VectorStore, VectorStoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

const RECORDS_FILE: &str = "vectors.jsonl";

/// One append lock per store file, shared by every handle in the process.
static APPEND_LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn append_lock(path: &Path) -> Arc<Mutex<()>> {
    let locks = APPEND_LOCKS.get_or_init(StdMutex::default);
    // Poisoning cannot leave the map half-updated.
    let mut locks = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(path.to_path_buf()).or_default().clone()
}

/// Record layout persisted by [`LocalVectorStore`], one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Identifier assigned on write.
    pub id: Uuid,
    /// Chunk text.
    pub text: String,
    /// Source metadata.
    pub metadata: Value,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// Append-only JSONL store rooted at a directory.
///
/// Each `write_many` appends its whole batch while holding the file's append lock, so batches
/// from concurrent requests never interleave.
pub struct LocalVectorStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    written: usize,
}

impl LocalVectorStore {
    /// Open (creating if needed) the store under `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, VectorStoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let path = fs::canonicalize(dir).await?.join(RECORDS_FILE);
        Ok(Self {
            lock: append_lock(&path),
            path,
            written: 0,
        })
    }

    /// Path of the backing JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record persisted under `dir`. A missing file yields no records.
    pub async fn read_records(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<StoredRecord>, VectorStoreError> {
        let path = dir.as_ref().join(RECORDS_FILE);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(VectorStoreError::from))
            .collect()
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn write_many(&mut self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        let mut buffer = Vec::new();
        for record in records {
            let stored = StoredRecord {
                id: Uuid::new_v4(),
                text: record.text,
                metadata: record.metadata,
                vector: record.vector,
            };
            serde_json::to_writer(&mut buffer, &stored)?;
            buffer.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        self.written += count;
        tracing::debug!(path = %self.path.display(), records = count, "Records appended");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VectorStoreError> {
        tracing::debug!(
            path = %self.path.display(),
            written = self.written,
            "Local vector store closed"
        );
        Ok(())
    }
}
