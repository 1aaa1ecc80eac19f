//! Google Gemini embedding provider

use super::{ensure_shape, BatchLimits, EmbeddingsProvider};
use crate::config::EmbeddingsConfig;
use crate::error::{EmbedError, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: GeminiContent,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

/// Gemini embeddings via the generative language API
pub struct GoogleEmbeddings {
    client: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_seq_length: usize,
}

impl GoogleEmbeddings {
    pub fn new(config: &EmbeddingsConfig, api_key: String) -> Self {
        Self {
            client: HttpClient::new(config.timeout),
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_seq_length: config.max_seq_length.unwrap_or(2048),
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![("x-goog-api-key", self.api_key.clone())]
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn content_request(&self, text: &str) -> EmbedContentRequest {
        EmbedContentRequest {
            model: self.model_path(),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        }
    }
}

#[async_trait]
impl EmbeddingsProvider for GoogleEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/v1beta/{}:embedContent",
            self.base_url.trim_end_matches('/'),
            self.model_path()
        );
        let response: EmbedContentResponse = self
            .client
            .post_json(&url, &self.content_request(text), &self.headers())
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = BatchEmbedRequest {
            requests: texts.iter().map(|t| self.content_request(t)).collect(),
        };
        let url = format!(
            "{}/v1beta/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model_path()
        );
        let response: BatchEmbedResponse =
            self.client.post_json(&url, &request, &self.headers()).await?;

        ensure_shape(texts.len(), response.embeddings.len())?;
        if response.embeddings.iter().any(|e| e.values.is_empty()) {
            return Err(EmbedError::Api("empty embedding in batch response".to_string()).into());
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
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
            max_inputs: 100,
            max_total_tokens: 100_000,
        }
    }
}
