//! Ollama embedding provider

use super::{ensure_shape, BatchLimits, EmbeddingsProvider};
use crate::config::EmbeddingsConfig;
use crate::error::{EmbedError, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Local Ollama server provider; no credentials required
pub struct OllamaEmbeddings {
    client: HttpClient,
    base_url: String,
    model: String,
    dimensions: usize,
    max_seq_length: usize,
}

impl OllamaEmbeddings {
    pub fn new(config: &EmbeddingsConfig) -> Self {
        Self {
            client: HttpClient::new(config.timeout),
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_seq_length: config.max_seq_length.unwrap_or(2048),
        }
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let sent = input.len();
        let request = OllamaEmbedRequest {
            model: self.model.clone(),
            input,
        };

        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let response: OllamaEmbedResponse = self.client.post_json(&url, &request, &[]).await?;

        ensure_shape(sent, response.embeddings.len())?;
        debug!("Embedded {} texts with ollama/{}", sent, self.model);
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingsProvider for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Api("empty embedding response".to_string()).into())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts.to_vec()).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_seq_length(&self) -> Option<usize> {
        Some(self.max_seq_length)
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_inputs: 512,
            max_total_tokens: 100_000,
        }
    }
}
