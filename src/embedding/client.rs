use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EmbeddingApiConfig;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate limited")]
    RateLimited,
    #[error("server error: status {0}")]
    ServerError(u16),
    #[error("client error: status {0}")]
    ClientError(u16),
}

impl EmbeddingClientError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EmbeddingClientError::Network(_)
                | EmbeddingClientError::RateLimited
                | EmbeddingClientError::ServerError(_)
        )
    }
}

/// Outbound HTTP client to the configured embedding service.
pub struct EmbeddingClient {
    http: reqwest::Client,
    api_url: String,
    api_key: SecretString,
    model: String,
    dimensions: Option<usize>,
}

impl EmbeddingClient {
    pub fn new(http: reqwest::Client, config: &EmbeddingApiConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: Some(config.dimensions),
        }
    }

    /// Embed a batch of inputs in a single request, returning one vector
    /// per input in the same order.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let body = EmbeddingRequest {
            input: inputs,
            model: &self.model,
            dimensions: self.dimensions,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingClientError::RateLimited);
        }
        if status.is_server_error() {
            return Err(EmbeddingClientError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            return Err(EmbeddingClientError::ClientError(status.as_u16()));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
