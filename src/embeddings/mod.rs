//! Embedding providers
//!
//! Every provider implements the same capability contract; the factory
//! picks one from configuration. Batches are planned against provider
//! limits using the same token counts the chunker produced.

pub mod google;
pub mod ollama;
pub mod openai;

pub use google::GoogleEmbeddings;
pub use ollama::OllamaEmbeddings;
pub use openai::{AzureOpenAiAdapter, OpenAiAdapter, OpenAiCompatibleEmbeddings};

use crate::config::{EmbeddingsConfig, EmbeddingsProviderKind};
use crate::error::{EmbedError, IngestError, Result};
use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;

/// Per-request limits a provider imposes on batches
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Maximum inputs per request
    pub max_inputs: usize,
    /// Maximum summed token count per request
    pub max_total_tokens: usize,
}

/// Capability contract every embedding provider implements
#[async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; output preserves input order and length
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector width, stable for the provider's lifetime
    fn dimensions(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Maximum input sequence length in tokens, when known
    fn max_seq_length(&self) -> Option<usize>;

    /// Request limits used to plan batches
    fn batch_limits(&self) -> BatchLimits;
}

impl std::fmt::Debug for dyn EmbeddingsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn EmbeddingsProvider")
            .field("model_name", &self.model_name())
            .finish()
    }
}

/// Plan contiguous batches over per-chunk token counts.
///
/// Each range stays within both limits; order is preserved so vectors
/// can be zipped back onto chunks by position.
pub fn plan_batches(token_counts: &[usize], limits: &BatchLimits) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0usize;
    let mut tokens = 0usize;

    for (i, &count) in token_counts.iter().enumerate() {
        let would_overflow = i > start
            && (i - start >= limits.max_inputs || tokens + count > limits.max_total_tokens);
        if would_overflow {
            batches.push(start..i);
            start = i;
            tokens = 0;
        }
        tokens += count;
    }
    if start < token_counts.len() {
        batches.push(start..token_counts.len());
    }
    batches
}

/// Fail with `EmbeddingShape` when a provider returns the wrong count
pub(crate) fn ensure_shape(sent: usize, received: usize) -> Result<()> {
    if sent != received {
        return Err(EmbedError::Shape { sent, received }.into());
    }
    Ok(())
}

/// Build the configured provider, surfacing credential problems now
pub fn build_provider(config: &EmbeddingsConfig) -> Result<Arc<dyn EmbeddingsProvider>> {
    match config.provider {
        EmbeddingsProviderKind::OpenAi => {
            let key = require_key(config, "embeddings.api_key")?;
            let adapter = OpenAiAdapter::new(Some(key), config.endpoint.clone());
            Ok(Arc::new(OpenAiCompatibleEmbeddings::new(adapter, config)))
        }
        EmbeddingsProviderKind::AzureOpenAi => {
            let key = require_key(config, "embeddings.api_key")?;
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                IngestError::ConfigInvalid(
                    "embeddings.endpoint is required for azure_openai".to_string(),
                )
            })?;
            let deployment = config.deployment.clone().ok_or_else(|| {
                IngestError::ConfigInvalid(
                    "embeddings.deployment is required for azure_openai".to_string(),
                )
            })?;
            let adapter = AzureOpenAiAdapter::new(endpoint, deployment, key);
            Ok(Arc::new(OpenAiCompatibleEmbeddings::new(adapter, config)))
        }
        EmbeddingsProviderKind::Ollama => Ok(Arc::new(OllamaEmbeddings::new(config))),
        EmbeddingsProviderKind::Google => {
            let key = require_key(config, "embeddings.api_key")?;
            Ok(Arc::new(GoogleEmbeddings::new(config, key)))
        }
    }
}

fn require_key(config: &EmbeddingsConfig, what: &str) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| IngestError::CredentialInvalid(format!("{} is not set", what)))
}
