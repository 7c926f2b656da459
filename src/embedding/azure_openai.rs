use super::{EmbeddingClient, EmbeddingClientError, build_http_client, ensure_vector_count};
use crate::config::{Config, require};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Embeddings served by an Azure OpenAI deployment.
pub struct AzureOpenAiEmbeddings {
    http: Client,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key: String,
}

impl AzureOpenAiEmbeddings {
    /// Build a client from the Azure OpenAI settings in `config`.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        let endpoint = require(
            config.azure_openai_endpoint.as_deref(),
            "AZURE_OPENAI_API_ENDPOINT",
        )?;
        let api_key = require(
            config.azure_openai_api_key.as_deref(),
            "AZURE_OPENAI_API_KEY",
        )?;
        Ok(Self {
            http: build_http_client("rusty-docs/azure-openai")?,
            endpoint,
            deployment: config.azure_openai_embeddings_deployment.clone(),
            api_version: config.azure_openai_api_version.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingClient for AzureOpenAiEmbeddings {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        tracing::debug!(
            deployment = %self.deployment,
            inputs = expected,
            "Requesting Azure OpenAI embeddings"
        );

        let response = self
            .http
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&json!({ "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Azure OpenAI at {}: {error}",
                    self.endpoint
                ))
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EmbeddingClientError::ProviderUnavailable(format!(
                    "Azure OpenAI rejected credentials ({})",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingClientError::GenerationFailed(format!(
                    "Azure OpenAI returned {status}: {body}"
                )));
            }
            _ => {}
        }

        let mut body: EmbeddingsResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Azure OpenAI response: {error}"
            ))
        })?;
        body.data.sort_by_key(|datum| datum.index);
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|datum| datum.embedding).collect();
        ensure_vector_count(expected, &vectors)?;
        Ok(vectors)
    }
}
