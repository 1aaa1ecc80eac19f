//! REST search-index vector store
//!
//! Speaks a batch document API: upserts and deletes go through
//! `docs/batch` actions, id listing pages through `docs/search` in
//! blocks of 1000. Supports integrated (server-side) vectorization.

use super::{SearchQuery, VectorStore};
use crate::config::VectorStoreConfig;
use crate::error::{IngestError, Result, StoreError};
use crate::http::{bearer_headers, HttpClient};
use crate::types::{ChunkDocument, SearchHit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const LIST_PAGE_SIZE: usize = 1000;
const DELETE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Serialize)]
struct IndexAction {
    #[serde(rename = "@search.action")]
    action: &'static str,
    chunk_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcefile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_num: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    figures: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
}

impl IndexAction {
    fn upsert(chunk: &ChunkDocument, include_embeddings: bool) -> Self {
        Self {
            action: "mergeOrUpload",
            chunk_id: chunk.chunk_id.clone(),
            sourcefile: Some(chunk.document.sourcefile.clone()),
            sourcepage: Some(chunk.page.sourcepage.clone()),
            page_num: Some(chunk.page.page_num),
            text: Some(chunk.text.clone()),
            token_count: Some(chunk.token_count),
            storage_url: Some(chunk.document.storage_url.clone()),
            tables: Some(chunk.tables.clone()),
            figures: Some(chunk.figures.clone()),
            embedding: if include_embeddings {
                chunk.embedding.clone()
            } else {
                None
            },
        }
    }

    fn delete(chunk_id: &str) -> Self {
        Self {
            action: "delete",
            chunk_id: chunk_id.to_string(),
            sourcefile: None,
            sourcepage: None,
            page_num: None,
            text: None,
            token_count: None,
            storage_url: None,
            tables: None,
            figures: None,
            embedding: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    value: Vec<IndexAction>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    value: Vec<BatchItemResult>,
}

#[derive(Debug, Deserialize)]
struct BatchItemResult {
    #[serde(rename = "key", default)]
    _key: Option<String>,
    status: bool,
    #[serde(rename = "statusCode")]
    status_code: u16,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    select: Option<String>,
    top: usize,
    skip: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    chunk_id: String,
    #[serde(default)]
    sourcefile: Option<String>,
    #[serde(default)]
    sourcepage: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "@search.score", default)]
    score: f32,
}

/// Vector store backed by a REST search index
pub struct RestIndexStore {
    client: HttpClient,
    endpoint: String,
    index: String,
    api_key: Option<String>,
    dimensions: usize,
    upload_batch_size: usize,
}

impl RestIndexStore {
    pub fn new(config: &VectorStoreConfig, dimensions: usize) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            IngestError::ConfigInvalid("vector_store.endpoint is required".to_string())
        })?;
        let index = config.index.clone().ok_or_else(|| {
            IngestError::ConfigInvalid("vector_store.index is required".to_string())
        })?;

        Ok(Self {
            client: HttpClient::new(config.timeout),
            endpoint,
            index,
            api_key: config.api_key.clone(),
            dimensions,
            upload_batch_size: config.upload_batch_size,
        })
    }

    fn docs_url(&self, suffix: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}",
            self.endpoint.trim_end_matches('/'),
            self.index,
            suffix
        )
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        bearer_headers(self.api_key.as_deref())
    }

    async fn send_batch(&self, actions: Vec<IndexAction>) -> Result<usize> {
        let count = actions.len();
        let request = BatchRequest { value: actions };
        let response: BatchResponse = self
            .client
            .post_json(&self.docs_url("batch"), &request, &self.headers())
            .await?;

        for item in &response.value {
            if !item.status {
                let err = if item.status_code == 409 {
                    StoreError::UpsertConflict(format!("status {}", item.status_code))
                } else {
                    StoreError::Unavailable(format!("batch item failed: {}", item.status_code))
                };
                return Err(err.into());
            }
        }
        Ok(count)
    }

    /// Page through matching chunk ids, 1000 at a time
    async fn list_chunk_ids(&self, filter: Option<String>) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut skip = 0usize;

        loop {
            let request = SearchRequest {
                search: Some("*".to_string()),
                filter: filter.clone(),
                select: Some("chunk_id".to_string()),
                top: LIST_PAGE_SIZE,
                skip,
            };
            let response: SearchResponse = self
                .client
                .post_json(&self.docs_url("search"), &request, &self.headers())
                .await?;

            let page_len = response.value.len();
            ids.extend(response.value.into_iter().map(|d| d.chunk_id));
            if page_len < LIST_PAGE_SIZE {
                break;
            }
            skip += page_len;
        }
        Ok(ids)
    }

    async fn delete_ids(&self, ids: Vec<String>) -> Result<usize> {
        let mut deleted = 0usize;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let actions: Vec<IndexAction> =
                batch.iter().map(|id| IndexAction::delete(id)).collect();
            deleted += self.send_batch(actions).await?;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl VectorStore for RestIndexStore {
    async fn upsert_documents(
        &self,
        chunks: &[ChunkDocument],
        include_embeddings: bool,
    ) -> Result<usize> {
        let mut uploaded = 0usize;
        for batch in chunks.chunks(self.upload_batch_size) {
            let actions: Vec<IndexAction> = batch
                .iter()
                .map(|c| IndexAction::upsert(c, include_embeddings))
                .collect();
            uploaded += self.send_batch(actions).await?;
            debug!("Upserted {}/{} chunks", uploaded, chunks.len());
        }
        Ok(uploaded)
    }

    async fn delete_by_sourcefile(&self, sourcefile: &str) -> Result<usize> {
        let filter = format!("sourcefile eq '{}'", sourcefile.replace('\'', "''"));
        let ids = self.list_chunk_ids(Some(filter)).await?;
        let deleted = self.delete_ids(ids).await?;
        if deleted > 0 {
            info!("Deleted {} prior chunks for {}", deleted, sourcefile);
        }
        Ok(deleted)
    }

    async fn delete_all(&self) -> Result<usize> {
        let ids = self.list_chunk_ids(None).await?;
        let deleted = self.delete_ids(ids).await?;
        info!("Deleted {} chunks from {}", deleted, self.index);
        Ok(deleted)
    }

    async fn search(
        &self,
        query: &SearchQuery,
        top_k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            search: Some(query.text.clone()),
            filter: filter.map(|f| f.to_string()),
            select: None,
            top: top_k,
            skip: 0,
        };
        let response: SearchResponse = self
            .client
            .post_json(&self.docs_url("search"), &request, &self.headers())
            .await?;

        Ok(response
            .value
            .into_iter()
            .map(|d| SearchHit {
                chunk_id: d.chunk_id,
                sourcefile: d.sourcefile.unwrap_or_default(),
                sourcepage: d.sourcepage.unwrap_or_default(),
                text: d.text.unwrap_or_default(),
                score: d.score,
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn supports_integrated_vectorization(&self) -> bool {
        true
    }
}
