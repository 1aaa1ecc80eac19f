//! Configuration for the ingestion pipeline

use crate::error::{IngestError, Result};
use crate::types::DocumentAction;
use serde::{Deserialize, Serialize};

/// Main configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Where source documents come from
    #[serde(default)]
    pub input: InputConfig,

    /// Where artifacts (full docs, page PDFs, figures, status) land
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Extraction behavior
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Figure description behavior
    #[serde(default)]
    pub media: MediaConfig,

    /// Table rendering mode
    #[serde(default)]
    pub tables: TableConfig,

    /// Chunking budgets
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embeddings provider selection
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Vector store selection
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Document action mode
    #[serde(default)]
    pub action: ActionConfig,

    /// Concurrency bounds
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Storage location kind shared by input and artifact configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Local,
    ObjectStore,
}

/// Input source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub mode: StorageMode,

    /// Glob pattern for local mode
    #[serde(default)]
    pub glob: Option<String>,

    /// Remote blob settings for object_store mode
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::Local,
            glob: None,
            object_store: None,
        }
    }
}

/// Connection settings for a REST object store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Service base URL
    pub base_url: String,
    pub container: String,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Substring filter applied to listed names
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_store_timeout")]
    pub timeout: u64,
}

fn default_store_timeout() -> u64 {
    60
}

/// Artifact sink configuration.
///
/// When `mode` is unset it derives from the input mode; an explicit
/// setting wins.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub mode: Option<StorageMode>,

    /// Directory for local mode
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,
}

impl ArtifactsConfig {
    /// Resolve the effective artifact mode against the input mode
    pub fn resolved_mode(&self, input_mode: StorageMode) -> StorageMode {
        self.mode.unwrap_or(input_mode)
    }
}

/// Which extractor handles document bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorMode {
    /// Plain-text family only
    Text,
    /// PDF adapter only
    Pdf,
    /// Pick per file extension
    Auto,
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub mode: ExtractorMode,

    /// Pages extracted in parallel per process (S_page)
    #[serde(default = "default_page_concurrency")]
    pub max_page_concurrency: usize,

    /// Keep a document alive when individual pages fail to extract
    #[serde(default = "default_true")]
    pub partial_page_tolerance: bool,
}

fn default_page_concurrency() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            max_page_concurrency: default_page_concurrency(),
            partial_page_tolerance: true,
        }
    }
}

/// Figure description configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub mode: MediaMode,

    /// Vision endpoint (OpenAI-compatible chat completions)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default = "default_vision_timeout")]
    pub timeout: u64,
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    Vision,
    Disabled,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            mode: MediaMode::Disabled,
            endpoint: None,
            api_key: None,
            model: default_vision_model(),
            timeout: default_vision_timeout(),
        }
    }
}

/// Table rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub render: TableRenderMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRenderMode {
    Plain,
    Markdown,
    Html,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            render: TableRenderMode::Markdown,
        }
    }
}

/// Chunking budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Requested chunk size in tokens
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,

    /// Overlap between successive chunks, percent of the effective budget
    #[serde(default = "default_overlap_percent")]
    pub overlap_percent: usize,

    /// Seed the first chunk of a page with the previous page's tail
    #[serde(default = "default_true")]
    pub cross_page_overlap: bool,

    /// Soft upper bound on chunk characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Hard override of the effective token budget
    #[serde(default)]
    pub absolute_max_tokens: Option<usize>,

    /// Fallback max sequence length when the provider does not report one
    #[serde(default)]
    pub fallback_max_seq_length: Option<usize>,
}

fn default_target_tokens() -> usize {
    500
}

fn default_overlap_percent() -> usize {
    10
}

fn default_max_chars() -> usize {
    2000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_percent: default_overlap_percent(),
            cross_page_overlap: true,
            max_chars: default_max_chars(),
            absolute_max_tokens: None,
            fallback_max_seq_length: None,
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingsProviderKind {
    OpenAi,
    AzureOpenAi,
    Ollama,
    Google,
}

/// Embeddings provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingsProviderKind,

    /// Base URL override; provider default when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Azure deployment name
    #[serde(default)]
    pub deployment: Option<String>,

    /// Expected vector dimensions; must match the store
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Provider max sequence length override
    #[serde(default)]
    pub max_seq_length: Option<usize>,

    /// Let the vector store compute vectors server-side
    #[serde(default)]
    pub integrated_vectorization: bool,

    /// Embedding batches in flight per document (S_embed)
    #[serde(default = "default_embed_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_embed_timeout")]
    pub timeout: u64,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_embed_concurrency() -> usize {
    10
}

fn default_embed_timeout() -> u64 {
    60
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingsProviderKind::OpenAi,
            endpoint: None,
            api_key: None,
            model: default_embedding_model(),
            deployment: None,
            dimensions: default_dimensions(),
            max_seq_length: None,
            integrated_vectorization: false,
            max_concurrency: default_embed_concurrency(),
            timeout: default_embed_timeout(),
        }
    }
}

/// Supported vector stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreKind {
    RestIndex,
    Sqlite,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub provider: VectorStoreKind,

    /// REST index endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// REST index name
    #[serde(default)]
    pub index: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// SQLite database path
    #[serde(default)]
    pub path: Option<String>,

    /// Vector width the index was built for; defaults to the
    /// embeddings dimensions when unset
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Chunks per upload batch, capped at 1000
    #[serde(default = "default_upload_batch_size")]
    pub upload_batch_size: usize,

    #[serde(default = "default_store_timeout")]
    pub timeout: u64,
}

fn default_upload_batch_size() -> usize {
    1000
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: VectorStoreKind::Sqlite,
            endpoint: None,
            index: None,
            api_key: None,
            path: None,
            dimensions: None,
            upload_batch_size: default_upload_batch_size(),
            timeout: default_store_timeout(),
        }
    }
}

/// Action mode configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionConfig {
    #[serde(default)]
    pub document_action: DocumentAction,

    /// Also delete artifacts on remove / remove_all
    #[serde(default)]
    pub cleanup_artifacts: bool,
}

/// Concurrency bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Documents processed in parallel (S_doc)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    3
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a file, format chosen by extension
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Validate structural constraints before any collaborator is built
    pub fn validate(&self) -> Result<()> {
        match self.input.mode {
            StorageMode::Local => {
                if self.input.glob.as_deref().unwrap_or("").is_empty() {
                    return Err(IngestError::ConfigInvalid(
                        "input.glob is required for local input".to_string(),
                    ));
                }
            }
            StorageMode::ObjectStore => {
                let os = self.input.object_store.as_ref().ok_or_else(|| {
                    IngestError::ConfigInvalid(
                        "input.object_store is required for object_store input".to_string(),
                    )
                })?;
                if os.base_url.is_empty() || os.container.is_empty() {
                    return Err(IngestError::ConfigInvalid(
                        "input.object_store needs base_url and container".to_string(),
                    ));
                }
            }
        }

        if self.artifacts.resolved_mode(self.input.mode) == StorageMode::ObjectStore
            && self.artifacts.object_store.is_none()
            && self.input.object_store.is_none()
        {
            return Err(IngestError::ConfigInvalid(
                "artifacts.object_store is required for object_store artifacts".to_string(),
            ));
        }

        if self.chunking.target_tokens == 0 {
            return Err(IngestError::ConfigInvalid(
                "chunking.target_tokens must be greater than 0".to_string(),
            ));
        }

        if self.chunking.overlap_percent >= 50 {
            return Err(IngestError::ConfigInvalid(
                "chunking.overlap_percent must be below 50".to_string(),
            ));
        }

        if self.embeddings.dimensions == 0 {
            return Err(IngestError::ConfigInvalid(
                "embeddings.dimensions must be greater than 0".to_string(),
            ));
        }

        if self.vector_store.upload_batch_size == 0 || self.vector_store.upload_batch_size > 1000 {
            return Err(IngestError::ConfigInvalid(
                "vector_store.upload_batch_size must be in 1..=1000".to_string(),
            ));
        }

        match self.vector_store.provider {
            VectorStoreKind::RestIndex => {
                if self.vector_store.endpoint.as_deref().unwrap_or("").is_empty()
                    || self.vector_store.index.as_deref().unwrap_or("").is_empty()
                {
                    return Err(IngestError::ConfigInvalid(
                        "vector_store.endpoint and vector_store.index are required for rest_index"
                            .to_string(),
                    ));
                }
            }
            VectorStoreKind::Sqlite => {
                if self.vector_store.path.as_deref().unwrap_or("").is_empty() {
                    return Err(IngestError::ConfigInvalid(
                        "vector_store.path is required for sqlite".to_string(),
                    ));
                }
                if self.embeddings.integrated_vectorization {
                    return Err(IngestError::ConfigInvalid(
                        "sqlite vector store does not support integrated vectorization"
                            .to_string(),
                    ));
                }
            }
        }

        if self.performance.max_workers == 0 {
            return Err(IngestError::ConfigInvalid(
                "performance.max_workers must be greater than 0".to_string(),
            ));
        }

        if self.extraction.max_page_concurrency == 0 {
            return Err(IngestError::ConfigInvalid(
                "extraction.max_page_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.embeddings.max_concurrency == 0 {
            return Err(IngestError::ConfigInvalid(
                "embeddings.max_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Fingerprint of the configuration with secrets removed.
    ///
    /// Recorded on the run summary so replays can be compared.
    pub fn fingerprint(&self) -> String {
        let mut redacted = self.clone();
        redacted.embeddings.api_key = None;
        redacted.media.api_key = None;
        redacted.vector_store.api_key = None;
        if let Some(os) = redacted.input.object_store.as_mut() {
            os.auth_token = None;
        }
        if let Some(os) = redacted.artifacts.object_store.as_mut() {
            os.auth_token = None;
        }
        let json = serde_json::to_string(&redacted).unwrap_or_default();
        format!("{:x}", md5::compute(json.as_bytes()))
    }
}
