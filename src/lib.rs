//! Docpipe - document ingestion pipeline
//!
//! Turns a heterogeneous collection of source documents into a
//! searchable vector index:
//! - Extraction (text and PDF adapters behind one interface)
//! - Enrichment (table rendering, figure description)
//! - Layout-aware chunking with adaptive token budgets
//! - Pluggable embedding providers and vector stores
//! - A bounded-concurrency orchestrator with retries and
//!   idempotent per-document replace
//!
//! # Example
//!
//! ```rust,no_run
//! use docpipe::{build_orchestrator, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_file("pipeline.toml")?;
//!     let orchestrator = build_orchestrator(config).await?;
//!
//!     let status = orchestrator.run().await?;
//!     println!("{}/{} documents indexed", status.succeeded, status.total_documents);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod factory;
pub mod http;
pub mod input;
pub mod media;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod tables;
pub mod tokens;
pub mod types;

// Re-export main types
pub use artifact::{ArtifactStore, LocalArtifactStore, ObjectStoreArtifactStore};
pub use chunker::{compute_budget, ChunkOutcome, Chunker, TokenBudget};
pub use config::{
    ChunkingConfig, EmbeddingsConfig, EmbeddingsProviderKind, ExtractorMode, MediaMode,
    PipelineConfig, StorageMode, TableRenderMode, VectorStoreKind,
};
pub use embeddings::{
    plan_batches, AzureOpenAiAdapter, BatchLimits, EmbeddingsProvider, GoogleEmbeddings,
    OllamaEmbeddings, OpenAiAdapter, OpenAiCompatibleEmbeddings,
};
pub use error::{EmbedError, ExtractError, IngestError, Result, StoreError};
pub use extract::{
    Extractor, ExtractorRegistry, ExtractorResolver, PagePdfSplitter, PdfExtractor, TextExtractor,
};
pub use factory::build_orchestrator;
pub use input::{InputSource, LocalInputSource, ObjectStoreInputSource, SourceDocument};
pub use media::{DisabledDescriber, MediaDescriber, VisionDescriber};
pub use pipeline::{ConcurrencyLimits, Orchestrator, RetryPolicies};
pub use retry::{retry, RetryPolicy};
pub use store::{RestIndexStore, SearchQuery, SqliteVectorStore, VectorStore};
pub use tables::TableRenderer;
pub use tokens::{counter_for_model, CharacterTokenCounter, TiktokenCounter, TokenCounter};
pub use types::{
    ChunkDocument, DocumentAction, DocumentMetadata, ExtractedImage, ExtractedPage,
    ExtractedTable, IngestionResult, PageMetadata, PipelineStatus, RunSummary, SearchHit,
    TableCell,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
