//! Postgres + pgvector adapter for managed deployments.

use super::{IndexConfig, ManagedVectorStore, VectorRecord, VectorStore, VectorStoreError};
use async_trait::async_trait;
use pgvector::Vector;
use tokio::task::JoinHandle;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls};

/// Connection-scoped handle on a pgvector table.
///
/// The table is created on connect when missing. Call [`VectorStore::close`] when done; dropping
/// the handle also ends the session but skips waiting for the connection task.
pub struct PgVectorStore {
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
    table: String,
    dimensions: usize,
}

impl PgVectorStore {
    /// Connect to Postgres and make sure the extension and table exist.
    pub async fn connect(
        connection_string: &str,
        table: &str,
        dimensions: usize,
    ) -> Result<Self, VectorStoreError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;
        let handle = tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(error = %error, "Postgres connection error");
            }
        });

        let mut store = Self {
            client: Some(client),
            connection: Some(handle),
            table: quote_ident(table),
            dimensions,
        };
        store.ensure_table().await?;
        tracing::debug!(table = %store.table, dimensions, "Connected to pgvector store");
        Ok(store)
    }

    fn client(&self) -> Result<&Client, VectorStoreError> {
        self.client.as_ref().ok_or(VectorStoreError::Closed)
    }

    async fn ensure_table(&mut self) -> Result<(), VectorStoreError> {
        let sql = schema_sql(&self.table, self.dimensions);
        self.run_locked(&sql).await
    }

    /// Run DDL in a transaction holding the schema advisory lock, so racing sessions take turns.
    async fn run_locked(&mut self, sql: &str) -> Result<(), VectorStoreError> {
        let client = self.client.as_mut().ok_or(VectorStoreError::Closed)?;
        let transaction = client.transaction().await?;
        transaction.batch_execute(&lock_sql()).await?;
        transaction.batch_execute(sql).await?;
        transaction.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn write_many(&mut self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let client = self.client()?;
        let statement = client.prepare(&insert_sql(&self.table)).await?;
        let total = records.len();
        for record in records {
            if record.vector.len() != self.dimensions {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: record.vector.len(),
                });
            }
            let vector = Vector::from(record.vector);
            let metadata = Json(record.metadata);
            client
                .execute(&statement, &[&record.text, &metadata, &vector])
                .await?;
        }
        tracing::debug!(table = %self.table, records = total, "Records written");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VectorStoreError> {
        drop(self.client.take());
        if let Some(handle) = self.connection.take()
            && let Err(error) = handle.await
        {
            tracing::warn!(error = %error, "Postgres connection task ended abnormally");
        }
        tracing::debug!(table = %self.table, "pgvector store closed");
        Ok(())
    }
}

#[async_trait]
impl ManagedVectorStore for PgVectorStore {
    async fn build_index(&mut self, config: IndexConfig) -> Result<(), VectorStoreError> {
        if config.dimensions != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: config.dimensions,
            });
        }
        let sql = index_sql(&self.table, config);
        self.run_locked(&sql).await?;
        tracing::debug!(
            table = %self.table,
            lists = config.lists,
            similarity = ?config.similarity,
            "Similarity index ensured"
        );
        Ok(())
    }
}

/// Advisory lock key shared by every session that changes the schema.
const SCHEMA_LOCK_KEY: i64 = 0x7275_7374_7964_6f63;

fn lock_sql() -> String {
    format!("SELECT pg_advisory_xact_lock({SCHEMA_LOCK_KEY})")
}

fn schema_sql(table: &str, dimensions: usize) -> String {
    format!(
        "CREATE EXTENSION IF NOT EXISTS vector;
         CREATE TABLE IF NOT EXISTS {table} (
             id BIGSERIAL PRIMARY KEY,
             content TEXT NOT NULL,
             metadata JSONB NOT NULL,
             embedding vector({dimensions}) NOT NULL
         )"
    )
}

fn insert_sql(table: &str) -> String {
    format!("INSERT INTO {table} (content, metadata, embedding) VALUES ($1, $2, $3)")
}

fn index_sql(table: &str, config: IndexConfig) -> String {
    let index_name = quote_ident(&format!(
        "{}_embedding_{}_idx",
        sanitize_ident(table),
        config.similarity.operator_class()
    ));
    format!(
        "CREATE INDEX IF NOT EXISTS {index_name} ON {table} \
         USING ivfflat (embedding {ops}) WITH (lists = {lists})",
        ops = config.similarity.operator_class(),
        lists = config.lists
    )
}

/// Quote a Postgres identifier, escaping embedded quotes.
fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .filter(|ch| *ch != '"')
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}
