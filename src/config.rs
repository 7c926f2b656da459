use serde::Deserialize;
use std::{env, path::Path};
use thiserror::Error;

const DEFAULT_AZURE_OPENAI_DEPLOYMENT: &str = "text-embedding-ada-002";
const DEFAULT_AZURE_OPENAI_API_VERSION: &str = "2024-02-01";
const DEFAULT_PGVECTOR_TABLE: &str = "documents";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OLLAMA_EMBEDDINGS_MODEL: &str = "nomic-embed-text";
const DEFAULT_LOCAL_VECTOR_STORE_DIR: &str = ".vectorstore";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 16;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Docs server.
///
/// Optional values stay `None` when the variable is unset or blank; presence of some of them
/// (Azure OpenAI endpoint, storage pair) switches pipeline behavior per request.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Azure OpenAI resource endpoint. Its presence selects managed indexing.
    pub azure_openai_endpoint: Option<String>,
    /// Key sent in the `api-key` header to Azure OpenAI.
    pub azure_openai_api_key: Option<String>,
    /// Deployment name of the Azure OpenAI embeddings model.
    pub azure_openai_embeddings_deployment: String,
    /// REST `api-version` used for Azure OpenAI calls.
    pub azure_openai_api_version: String,
    /// Postgres connection string for the managed pgvector store.
    pub pgvector_connection_string: Option<String>,
    /// Table receiving managed vector records.
    pub pgvector_table: String,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Model used for local embeddings.
    pub ollama_embeddings_model: String,
    /// Directory backing the local vector store.
    pub local_vector_store_dir: String,
    /// Azure Storage connection string used for archiving uploads.
    pub storage_connection_string: Option<String>,
    /// Blob container receiving archived uploads.
    pub storage_container_name: Option<String>,
    /// Maximum chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Upper bound on accepted request bodies.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            azure_openai_endpoint: load_env_optional("AZURE_OPENAI_API_ENDPOINT"),
            azure_openai_api_key: load_env_optional("AZURE_OPENAI_API_KEY"),
            azure_openai_embeddings_deployment: load_env_optional(
                "AZURE_OPENAI_API_EMBEDDINGS_DEPLOYMENT_NAME",
            )
            .unwrap_or_else(|| DEFAULT_AZURE_OPENAI_DEPLOYMENT.to_string()),
            azure_openai_api_version: load_env_optional("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_OPENAI_API_VERSION.to_string()),
            pgvector_connection_string: load_env_optional("AZURE_PGVECTOR_CONNECTION_STRING"),
            pgvector_table: load_env_optional("AZURE_PGVECTOR_TABLE")
                .unwrap_or_else(|| DEFAULT_PGVECTOR_TABLE.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            ollama_embeddings_model: load_env_optional("OLLAMA_EMBEDDINGS_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_EMBEDDINGS_MODEL.to_string()),
            local_vector_store_dir: load_env_optional("LOCAL_VECTOR_STORE_DIR")
                .unwrap_or_else(|| DEFAULT_LOCAL_VECTOR_STORE_DIR.to_string()),
            storage_connection_string: load_env_optional("AZURE_STORAGE_CONNECTION_STRING"),
            storage_container_name: load_env_optional("AZURE_STORAGE_CONTAINER_NAME"),
            text_splitter_chunk_size: load_parsed("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            text_splitter_chunk_overlap: load_parsed("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            embedding_batch_size: load_parsed("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE),
            max_upload_bytes: load_parsed("MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            server_port: load_parsed("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that individual parsers cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_SIZE".to_string(),
            ));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".to_string(),
            ));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    /// Local-mode configuration with no archive target.
    fn default() -> Self {
        Self {
            azure_openai_endpoint: None,
            azure_openai_api_key: None,
            azure_openai_embeddings_deployment: DEFAULT_AZURE_OPENAI_DEPLOYMENT.to_string(),
            azure_openai_api_version: DEFAULT_AZURE_OPENAI_API_VERSION.to_string(),
            pgvector_connection_string: None,
            pgvector_table: DEFAULT_PGVECTOR_TABLE.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_embeddings_model: DEFAULT_OLLAMA_EMBEDDINGS_MODEL.to_string(),
            local_vector_store_dir: DEFAULT_LOCAL_VECTOR_STORE_DIR.to_string(),
            storage_connection_string: None,
            storage_container_name: None,
            text_splitter_chunk_size: DEFAULT_CHUNK_SIZE,
            text_splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            server_port: None,
        }
    }
}

/// Fetch a variable that must be present, used by adapters that only need it in one mode.
pub(crate) fn require(value: Option<&str>, key: &str) -> Result<String, ConfigError> {
    value
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Load `.env` (or the given file) into the process environment.
///
/// A missing default `.env` is not an error; a missing explicit file is.
pub fn load_env_file(env_file: Option<&Path>) -> Result<(), dotenvy::Error> {
    match env_file {
        Some(path) => dotenvy::from_path(path),
        None => match dotenvy::dotenv() {
            Ok(_) => Ok(()),
            Err(error) if error.not_found() => Ok(()),
            Err(error) => Err(error),
        },
    }
}

/// Build the configuration from the process environment and log the resolved settings.
pub fn init_config() -> Result<Config, ConfigError> {
    let config = Config::from_env()?;
    tracing::debug!(
        managed_endpoint = ?config.azure_openai_endpoint,
        pgvector_table = %config.pgvector_table,
        ollama_url = %config.ollama_url,
        ollama_model = %config.ollama_embeddings_model,
        archive_container = ?config.storage_container_name,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}
