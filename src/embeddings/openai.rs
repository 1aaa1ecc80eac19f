//! OpenAI-compatible embedding providers
//!
//! One generic provider covers every service speaking the OpenAI
//! embeddings wire shape; adapters supply the URL and auth convention.

use super::{ensure_shape, BatchLimits, EmbeddingsProvider};
use crate::config::EmbeddingsConfig;
use crate::error::{EmbedError, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Adapter supplying provider-specific routing and authentication
pub trait OpenAiCompatible: Send + Sync {
    /// Full URL of the embeddings endpoint
    fn embeddings_url(&self) -> String;

    /// Auth headers for every request
    fn auth_headers(&self) -> Vec<(&'static str, String)>;
}

/// Plain OpenAI adapter
pub struct OpenAiAdapter {
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
        }
    }
}

impl OpenAiCompatible for OpenAiAdapter {
    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(key) = &self.api_key {
            headers.push(("Authorization", format!("Bearer {}", key)));
        }
        headers
    }
}

/// Azure OpenAI adapter: deployment-scoped URL, `api-key` header
pub struct AzureOpenAiAdapter {
    endpoint: String,
    deployment: String,
    api_key: String,
}

impl AzureOpenAiAdapter {
    pub fn new(endpoint: String, deployment: String, api_key: String) -> Self {
        Self {
            endpoint,
            deployment,
            api_key,
        }
    }
}

impl OpenAiCompatible for AzureOpenAiAdapter {
    fn embeddings_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version=2024-06-01",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![("api-key", self.api_key.clone())]
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Generic provider over an OpenAI-compatible adapter
pub struct OpenAiCompatibleEmbeddings<T: OpenAiCompatible> {
    adapter: T,
    client: HttpClient,
    model: String,
    dimensions: usize,
    max_seq_length: usize,
}

impl<T: OpenAiCompatible> OpenAiCompatibleEmbeddings<T> {
    pub fn new(adapter: T, config: &EmbeddingsConfig) -> Self {
        Self {
            adapter,
            client: HttpClient::new(config.timeout),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_seq_length: config.max_seq_length.unwrap_or(8191),
        }
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let sent = input.len();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
            // text-embedding-3 models honor reduced output dimensions
            dimensions: Some(self.dimensions),
        };

        let url = self.adapter.embeddings_url();
        let headers = self.adapter.auth_headers();
        let response: EmbeddingResponse = self.client.post_json(&url, &request, &headers).await?;

        ensure_shape(sent, response.data.len())?;

        // The API reports an index per vector; restore input order
        let mut indexed = response.data;
        indexed.sort_by_key(|d| d.index);
        if indexed.iter().enumerate().any(|(i, d)| d.index != i) {
            return Err(EmbedError::Shape {
                sent,
                received: indexed.len(),
            }
            .into());
        }

        debug!("Embedded {} texts with {}", sent, self.model);
        Ok(indexed.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl<T: OpenAiCompatible> EmbeddingsProvider for OpenAiCompatibleEmbeddings<T> {
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
            max_inputs: 2048,
            max_total_tokens: 300_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_adapter_defaults() {
        let adapter = OpenAiAdapter::new(Some("k".to_string()), None);
        assert_eq!(adapter.embeddings_url(), "https://api.openai.com/v1/embeddings");
        assert_eq!(adapter.auth_headers()[0].1, "Bearer k");
    }

    #[test]
    fn test_openai_adapter_custom_base() {
        let adapter = OpenAiAdapter::new(None, Some("https://proxy.example/v1/".to_string()));
        assert_eq!(adapter.embeddings_url(), "https://proxy.example/v1/embeddings");
        assert!(adapter.auth_headers().is_empty());
    }

    #[test]
    fn test_azure_adapter_url() {
        let adapter = AzureOpenAiAdapter::new(
            "https://acct.openai.azure.com".to_string(),
            "embed-small".to_string(),
            "key".to_string(),
        );
        assert_eq!(
            adapter.embeddings_url(),
            "https://acct.openai.azure.com/openai/deployments/embed-small/embeddings?api-version=2024-06-01"
        );
        assert_eq!(adapter.auth_headers()[0].0, "api-key");
    }
}
