//! Embedding client abstraction and the two HTTP adapters used by the indexer.
//!
//! Managed deployments embed through Azure OpenAI; local deployments talk to an Ollama runtime.
//! Both adapters issue plain `reqwest` calls and return one vector per input text, in input order.

mod azure_openai;
mod ollama;

pub use azure_openai::AzureOpenAiEmbeddings;
pub use ollama::OllamaEmbeddings;

use crate::config::ConfigError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Adapter settings were incomplete.
    #[error("Embedding provider not configured: {0}")]
    Configuration(#[from] ConfigError),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

fn build_http_client(user_agent: &str) -> Result<reqwest::Client, EmbeddingClientError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to build HTTP client: {error}"
            ))
        })
}

fn ensure_vector_count(
    expected: usize,
    vectors: &[Vec<f32>],
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected} embeddings, received {}",
            vectors.len()
        )));
    }
    Ok(())
}
