//! Error handling for the ingestion pipeline

use thiserror::Error;

/// Result type alias for the ingestion pipeline
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("invalid credentials: {0}")]
    CredentialInvalid(String),

    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("artifact store unavailable: {0}")]
    ArtifactStoreDown(String),

    #[error("chunk exceeds token budget: {0}")]
    IntegrityChunkOversize(String),

    #[error("API rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while extracting pages from document bytes
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("page {page} extraction failed: {reason}")]
    Page { page: u32, reason: String },

    #[error("no pages could be extracted")]
    Empty,
}

/// Errors raised by embedding providers
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("batch shape mismatch: sent {sent} inputs, got {received} vectors")]
    Shape { sent: usize, received: usize },

    #[error("embedding request failed: {0}")]
    Api(String),
}

/// Errors raised by vector stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dimension mismatch: store expects {store}, provider produces {provider}")]
    DimensionMismatch { store: usize, provider: usize },

    #[error("upsert conflict: {0}")]
    UpsertConflict(String),

    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        // Finer status mapping happens in the HTTP wrapper; anything that
        // reaches this conversion is a transport-level failure.
        IngestError::TransientNetwork(e.to_string())
    }
}

impl IngestError {
    /// Check if the error should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IngestError::TransientNetwork(_)
                | IngestError::RateLimited(_)
                | IngestError::ArtifactStoreDown(_)
                | IngestError::Store(StoreError::UpsertConflict(_))
                | IngestError::Store(StoreError::Unavailable(_))
        )
    }

    /// Check if the error aborts the whole run rather than one document
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::ConfigInvalid(_)
                | IngestError::CredentialInvalid(_)
                | IngestError::Store(StoreError::DimensionMismatch { .. })
        )
    }

    /// Stable kind identifier recorded on ingestion results
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::ConfigInvalid(_) => "ConfigInvalid",
            IngestError::CredentialInvalid(_) => "CredentialInvalid",
            IngestError::TransientNetwork(_) => "TransientNetwork",
            IngestError::RateLimited(_) => "RateLimited",
            IngestError::UnsupportedFormat(_) => "UnsupportedFormat",
            IngestError::Extract(_) => "ExtractionFailed",
            IngestError::Embed(EmbedError::Shape { .. }) => "EmbeddingShape",
            IngestError::Embed(EmbedError::Api(_)) => "EmbeddingFailed",
            IngestError::Store(StoreError::DimensionMismatch { .. }) => "DimensionMismatch",
            IngestError::Store(StoreError::UpsertConflict(_)) => "UpsertConflict",
            IngestError::Store(_) => "VectorStoreDown",
            IngestError::ArtifactStoreDown(_) => "ArtifactStoreDown",
            IngestError::IntegrityChunkOversize(_) => "IntegrityChunkOversize",
            IngestError::Api { .. } => "ApiRejected",
            IngestError::Io(_) => "Io",
            IngestError::Serialization(_) => "Serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(IngestError::TransientNetwork("timeout".into()).is_transient());
        assert!(IngestError::RateLimited("429".into()).is_transient());
        assert!(IngestError::Store(StoreError::Unavailable("503".into())).is_transient());
        assert!(!IngestError::ConfigInvalid("bad glob".into()).is_transient());
        assert!(!IngestError::Embed(EmbedError::Shape { sent: 4, received: 3 }).is_transient());
    }

    #[test]
    fn test_run_fatal_classification() {
        assert!(IngestError::CredentialInvalid("no key".into()).is_run_fatal());
        assert!(IngestError::Store(StoreError::DimensionMismatch {
            store: 1536,
            provider: 768
        })
        .is_run_fatal());
        assert!(!IngestError::UnsupportedFormat("xyz".into()).is_run_fatal());
    }

    #[test]
    fn test_error_kind() {
        let err = IngestError::Extract(ExtractError::Page {
            page: 3,
            reason: "timeout".into(),
        });
        assert_eq!(err.kind(), "ExtractionFailed");

        let err = IngestError::Embed(EmbedError::Shape { sent: 2, received: 1 });
        assert_eq!(err.kind(), "EmbeddingShape");
    }
}
