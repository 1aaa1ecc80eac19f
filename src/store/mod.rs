//! Vector stores
//!
//! Two implementations stand behind one capability contract: a REST
//! search index (server-side vectorization capable) and a SQLite file
//! store (client-side vectors only).

pub mod rest;
pub mod sqlite;

pub use rest::RestIndexStore;
pub use sqlite::SqliteVectorStore;

use crate::error::Result;
use crate::types::{ChunkDocument, SearchHit};
use async_trait::async_trait;

/// A search request; the text is used by stores that embed server-side,
/// the vector by stores that only rank client-computed embeddings.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub vector: Option<Vec<f32>>,
}

/// Capability contract for vector stores
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Merge-or-upload chunks keyed by chunk_id; idempotent across
    /// retries. With `include_embeddings` false the store computes
    /// vectors server-side.
    async fn upsert_documents(
        &self,
        chunks: &[ChunkDocument],
        include_embeddings: bool,
    ) -> Result<usize>;

    /// Delete every chunk whose sourcefile matches; paginated internally
    async fn delete_by_sourcefile(&self, sourcefile: &str) -> Result<usize>;

    /// Delete every chunk in the store; paginated internally
    async fn delete_all(&self) -> Result<usize>;

    /// Rank chunks against a query; not exercised by ingestion
    async fn search(
        &self,
        query: &SearchQuery,
        top_k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// Vector width the index was built for
    fn dimensions(&self) -> usize;

    /// Whether the store can compute vectors server-side
    fn supports_integrated_vectorization(&self) -> bool;
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        let c = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
