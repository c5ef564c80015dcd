//! Ollama embedding client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kb_core::{BackendConfig, EmbeddingService, KbError, Result};

use crate::{check_status, http_client};

/// Embeds text with a model served by Ollama.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Create a client for `model` at `base_url`.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = http_client(timeout).map_err(|e| KbError::embedding(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Create a client from the backend configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(
            &config.ollama_url,
            &config.embed_model,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| KbError::embedding(format!("Failed to send request: {}", e)))?;
        let response = check_status(response, KbError::embedding).await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| KbError::embedding(format!("Failed to parse embedding: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(KbError::embedding(format!(
                "Model {} returned an empty embedding",
                self.model
            )));
        }

        debug!("Embedded {} chars into {} dims", text.len(), parsed.embedding.len());
        Ok(parsed.embedding)
    }
}
