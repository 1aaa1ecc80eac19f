//! SQLite-backed vector store

use super::{cosine_similarity, SearchQuery, VectorStore};
use crate::config::VectorStoreConfig;
use crate::error::{IngestError, Result, StoreError};
use crate::types::{ChunkDocument, SearchHit};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

const DELETE_PAGE_SIZE: i64 = 1000;
const INSERT_TX_SIZE: usize = 500;

/// File-backed store ranking with brute-force cosine similarity.
///
/// Vectors are always computed client-side; integrated vectorization is
/// rejected at construction.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    dimensions: usize,
}

impl SqliteVectorStore {
    /// Open (or create) the database and prepare the schema
    pub async fn connect(config: &VectorStoreConfig, dimensions: usize) -> Result<Self> {
        let path = config.path.clone().ok_or_else(|| {
            IngestError::ConfigInvalid("vector_store.path is required".to_string())
        })?;

        // An in-memory database exists per connection; it must not be
        // spread across a pool.
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite://{}?mode=rwc", path), 4)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(StoreError::Backend)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                sourcefile TEXT NOT NULL,
                sourcepage TEXT NOT NULL,
                page_num INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                storage_url TEXT NOT NULL,
                tables TEXT NOT NULL,
                figures TEXT NOT NULL,
                embedding BLOB
            )",
        )
        .execute(&pool)
        .await
        .map_err(StoreError::Backend)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_sourcefile ON chunks(sourcefile)")
            .execute(&pool)
            .await
            .map_err(StoreError::Backend)?;

        info!("Opened sqlite vector store at {}", path);
        Ok(Self { pool, dimensions })
    }

    /// Serialize embedding for storage
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding
            .iter()
            .flat_map(|f| f.to_le_bytes().to_vec())
            .collect()
    }

    /// Deserialize embedding from storage
    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Total rows currently stored
    pub async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Backend)?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    /// Chunk ids currently stored for one sourcefile, ordered
    pub async fn chunk_ids_for(&self, sourcefile: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT chunk_id FROM chunks WHERE sourcefile = ? ORDER BY chunk_id")
            .bind(sourcefile)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Backend)?;
        Ok(rows.iter().map(|r| r.get("chunk_id")).collect())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_documents(
        &self,
        chunks: &[ChunkDocument],
        include_embeddings: bool,
    ) -> Result<usize> {
        if !include_embeddings {
            return Err(IngestError::ConfigInvalid(
                "sqlite vector store cannot vectorize server-side".to_string(),
            ));
        }

        let mut upserted = 0usize;
        for batch in chunks.chunks(INSERT_TX_SIZE) {
            let mut tx = self.pool.begin().await.map_err(StoreError::Backend)?;
            for chunk in batch {
                let embedding = chunk.embedding.as_ref().map(|e| Self::serialize_embedding(e));
                sqlx::query(
                    "INSERT OR REPLACE INTO chunks
                     (chunk_id, sourcefile, sourcepage, page_num, text, token_count,
                      storage_url, tables, figures, embedding)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&chunk.chunk_id)
                .bind(&chunk.document.sourcefile)
                .bind(&chunk.page.sourcepage)
                .bind(chunk.page.page_num as i64)
                .bind(&chunk.text)
                .bind(chunk.token_count as i64)
                .bind(&chunk.document.storage_url)
                .bind(serde_json::to_string(&chunk.tables)?)
                .bind(serde_json::to_string(&chunk.figures)?)
                .bind(embedding)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Backend)?;
            }
            tx.commit().await.map_err(StoreError::Backend)?;
            upserted += batch.len();
            debug!("Upserted {}/{} chunks", upserted, chunks.len());
        }
        Ok(upserted)
    }

    async fn delete_by_sourcefile(&self, sourcefile: &str) -> Result<usize> {
        let mut deleted = 0usize;
        loop {
            let result = sqlx::query(
                "DELETE FROM chunks WHERE chunk_id IN
                 (SELECT chunk_id FROM chunks WHERE sourcefile = ? LIMIT ?)",
            )
            .bind(sourcefile)
            .bind(DELETE_PAGE_SIZE)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Backend)?;

            let n = result.rows_affected() as usize;
            deleted += n;
            if n < DELETE_PAGE_SIZE as usize {
                break;
            }
        }
        if deleted > 0 {
            info!("Deleted {} prior chunks for {}", deleted, sourcefile);
        }
        Ok(deleted)
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut deleted = 0usize;
        loop {
            let result = sqlx::query(
                "DELETE FROM chunks WHERE chunk_id IN
                 (SELECT chunk_id FROM chunks LIMIT ?)",
            )
            .bind(DELETE_PAGE_SIZE)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Backend)?;

            let n = result.rows_affected() as usize;
            deleted += n;
            if n < DELETE_PAGE_SIZE as usize {
                break;
            }
        }
        info!("Deleted {} chunks", deleted);
        Ok(deleted)
    }

    async fn search(
        &self,
        query: &SearchQuery,
        top_k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let vector = query.vector.as_ref().ok_or_else(|| {
            IngestError::ConfigInvalid(
                "sqlite vector store requires a query vector".to_string(),
            )
        })?;

        let rows = match filter {
            Some(sourcefile) => {
                sqlx::query(
                    "SELECT chunk_id, sourcefile, sourcepage, text, embedding
                     FROM chunks WHERE sourcefile = ?",
                )
                .bind(sourcefile)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT chunk_id, sourcefile, sourcepage, text, embedding FROM chunks",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::Backend)?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let blob: Option<Vec<u8>> = row.get("embedding");
                let embedding = Self::deserialize_embedding(&blob?);
                Some(SearchHit {
                    chunk_id: row.get("chunk_id"),
                    sourcefile: row.get("sourcefile"),
                    sourcepage: row.get("sourcepage"),
                    text: row.get("text"),
                    score: cosine_similarity(vector, &embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn supports_integrated_vectorization(&self) -> bool {
        false
    }
}
