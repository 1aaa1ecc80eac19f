//! Pipeline orchestration
//!
//! Drives every discovered document through read, artifact upload,
//! extraction, enrichment, chunking, embedding, and upsert, under the
//! three-level concurrency hierarchy. Document failures are terminal
//! for the document only; the run always completes.

pub mod limits;

pub use limits::{ConcurrencyLimits, Permit};

use crate::artifact::{self, layout, ArtifactStore};
use crate::chunker::Chunker;
use crate::config::PipelineConfig;
use crate::embeddings::{plan_batches, EmbeddingsProvider};
use crate::error::{EmbedError, ExtractError, IngestError, Result};
use crate::extract::{ExtractorRegistry, ExtractorResolver, PagePdfSplitter};
use crate::input::InputSource;
use crate::media::MediaDescriber;
use crate::retry::{retry, RetryPolicy};
use crate::store::VectorStore;
use crate::tables::TableRenderer;
use crate::tokens::TokenCounter;
use crate::types::{
    ChunkDocument, DocumentAction, DocumentMetadata, ExtractedPage, IngestionResult,
    PageMetadata, PipelineStatus, RunSummary,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Per-document manifest persisted next to the page artifacts
#[derive(Debug, Serialize)]
struct DocumentManifest<'a> {
    document: &'a DocumentMetadata,
    pages: Vec<&'a PageMetadata>,
    chunk_ids: Vec<&'a str>,
    indexed_at: String,
}

/// Retry policies per remote resource class
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicies {
    pub storage: RetryPolicy,
    pub extraction: RetryPolicy,
    pub embeddings: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            storage: RetryPolicy::storage(),
            extraction: RetryPolicy::extraction(),
            embeddings: RetryPolicy::embeddings(),
        }
    }
}

/// The top-level ingestion state machine
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    input: Arc<dyn InputSource>,
    artifacts: Arc<dyn ArtifactStore>,
    extractors: Arc<dyn ExtractorResolver>,
    splitter: Arc<PagePdfSplitter>,
    renderer: Arc<TableRenderer>,
    describer: Arc<dyn MediaDescriber>,
    counter: Arc<dyn TokenCounter>,
    provider: Arc<dyn EmbeddingsProvider>,
    store: Arc<dyn VectorStore>,
    limits: ConcurrencyLimits,
    policies: RetryPolicies,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("limits", &self.limits)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        input: Arc<dyn InputSource>,
        artifacts: Arc<dyn ArtifactStore>,
        describer: Arc<dyn MediaDescriber>,
        counter: Arc<dyn TokenCounter>,
        provider: Arc<dyn EmbeddingsProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let limits = ConcurrencyLimits::new(
            config.performance.max_workers,
            config.extraction.max_page_concurrency,
            config.embeddings.max_concurrency,
        );
        let extractors = Arc::new(ExtractorRegistry::new(config.extraction.mode));
        let renderer = Arc::new(TableRenderer::new(config.tables.render));

        Self {
            extractors,
            splitter: Arc::new(PagePdfSplitter::new()),
            renderer,
            input,
            artifacts,
            describer,
            counter,
            provider,
            store,
            limits,
            config: Arc::new(config),
            policies: RetryPolicies::default(),
        }
    }

    /// Swap in a different extractor resolver
    pub fn with_extractors(mut self, extractors: Arc<dyn ExtractorResolver>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Override the retry policies
    pub fn with_retry_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Run the configured document action to completion.
    ///
    /// Returns only after every discovered document reached a terminal
    /// state; per-document failures are recorded, never propagated.
    pub async fn run(&self) -> Result<PipelineStatus> {
        let started_at = now_iso();
        let run_started = Instant::now();

        let results = match self.config.action.document_action {
            DocumentAction::Add => self.run_add().await?,
            DocumentAction::Remove => self.run_remove().await?,
            DocumentAction::RemoveAll => {
                self.run_remove_all().await?;
                Vec::new()
            }
        };

        let succeeded = results.iter().filter(|r| r.success).count();
        let status = PipelineStatus {
            started_at,
            finished_at: now_iso(),
            total_documents: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        };

        info!(
            "Run finished in {:.1}s: {}/{} documents succeeded",
            run_started.elapsed().as_secs_f64(),
            status.succeeded,
            status.total_documents
        );

        self.persist_summary(&status).await;
        Ok(status)
    }

    /// ADD mode: process every discovered file through the full pipeline
    async fn run_add(&self) -> Result<Vec<IngestionResult>> {
        let files = retry(self.policies.storage, "list input", || self.input.list()).await?;
        if files.is_empty() {
            warn!("No input documents matched the configuration");
            return Ok(Vec::new());
        }

        let (work_tx, work_rx) = flume::unbounded::<(usize, String)>();
        for item in files.into_iter().enumerate() {
            let _ = work_tx.send(item);
        }
        drop(work_tx);

        let (result_tx, result_rx) = flume::unbounded::<(usize, IngestionResult)>();
        let worker_count = self.limits.max_docs();
        let mut handles = Vec::with_capacity(worker_count);

        for _ in 0..worker_count {
            let orchestrator = self.clone();
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();

            handles.push(tokio::spawn(async move {
                while let Ok((index, file_id)) = work_rx.recv_async().await {
                    let _permit = orchestrator.limits.acquire_doc().await;
                    let result = orchestrator.process_one(&file_id).await;
                    let _ = result_tx.send((index, result));
                }
            }));
        }
        drop(result_tx);

        futures::future::join_all(handles).await;

        let mut indexed: Vec<(usize, IngestionResult)> = result_rx.drain().collect();
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, r)| r).collect())
    }

    /// Process one document, mapping any error onto its IngestionResult
    async fn process_one(&self, file_id: &str) -> IngestionResult {
        let started = Instant::now();
        let filename = file_id.rsplit('/').next().unwrap_or(file_id).to_string();

        match self.process_document(file_id).await {
            Ok((chunks_indexed, warnings)) => {
                info!(
                    "Indexed {} ({} chunks, {:.1}s)",
                    filename,
                    chunks_indexed,
                    started.elapsed().as_secs_f64()
                );
                IngestionResult::ok(
                    &filename,
                    chunks_indexed,
                    warnings,
                    started.elapsed().as_secs_f64(),
                )
            }
            Err(e) => {
                warn!("Document {} failed: {} ({})", filename, e, e.kind());
                IngestionResult::failed(
                    &filename,
                    e.kind(),
                    &e.to_string(),
                    started.elapsed().as_secs_f64(),
                )
            }
        }
    }

    /// The per-document state machine
    async fn process_document(&self, file_id: &str) -> Result<(usize, Vec<String>)> {
        let mut warnings = Vec::new();

        // READ
        let source = retry(self.policies.storage, "read input", || {
            self.input.read(file_id)
        })
        .await?;
        let sourcefile = source.filename.clone();
        let extractor = self.extractors.resolve(&sourcefile)?;

        // UPLOAD_FULL
        let doc_path = layout::document(&sourcefile);
        let bytes = source.bytes;
        let storage_url = retry(self.policies.storage, "upload document", || {
            self.artifacts.upload(&doc_path, bytes.clone())
        })
        .await?;
        let document = DocumentMetadata::new(&sourcefile, &storage_url, &bytes);

        // SPLIT_PAGES + EXTRACT
        let mut pages = if extractor.paginated() {
            self.extract_paginated(&sourcefile, &bytes, &mut warnings)
                .await?
        } else {
            let extracted = retry(self.policies.extraction, "extract document", || {
                extractor.extract(&sourcefile, &bytes)
            })
            .await?;
            extracted
                .into_iter()
                .map(|page| {
                    let meta = PageMetadata::new(&sourcefile, page.page_num, None);
                    (meta, page)
                })
                .collect()
        };

        if pages.is_empty() {
            return Err(ExtractError::Empty.into());
        }

        // ENRICH_TABLES (pure CPU)
        for (_, page) in pages.iter_mut() {
            for table in page.tables.iter_mut() {
                self.renderer.enrich(table, self.counter.as_ref());
            }
        }

        // ENRICH_IMAGES (sequential per document)
        self.enrich_images(&sourcefile, &mut pages, &mut warnings)
            .await;

        // CHUNK
        let max_seq = self
            .provider
            .max_seq_length()
            .or(self.config.chunking.fallback_max_seq_length)
            .unwrap_or(8191);
        let (chunker, budget_warning) =
            Chunker::new(self.counter.as_ref(), &self.config.chunking, max_seq);
        warnings.extend(budget_warning);

        let outcome = chunker.chunk_document(&document, &pages);
        warnings.extend(outcome.warnings);
        let mut chunks = outcome.chunks;

        // Content budget + overlap rider + one token for the seam
        // separator between them.
        let budget = chunker.budget();
        let hard_cap = budget.effective_max_tokens + budget.overlap_tokens + 1;
        for chunk in &chunks {
            let sentinel_only = chunk.tables.len() + chunk.figures.len() == 1;
            if chunk.token_count > hard_cap && !sentinel_only {
                return Err(IngestError::IntegrityChunkOversize(format!(
                    "{} has {} tokens (cap {})",
                    chunk.chunk_id, chunk.token_count, hard_cap
                )));
            }
        }

        if chunks.is_empty() {
            warn!("{} produced no chunks", sourcefile);
        }

        // EMBED (skipped under integrated vectorization)
        let integrated = self.config.embeddings.integrated_vectorization;
        if !integrated && !chunks.is_empty() {
            self.embed_chunks(&mut chunks).await?;
        }

        // DELETE_PRIOR_BY_SOURCEFILE + UPSERT: idempotent replace
        retry(self.policies.storage, "delete prior chunks", || {
            self.store.delete_by_sourcefile(&sourcefile)
        })
        .await?;

        let upserted = if chunks.is_empty() {
            0
        } else {
            retry(self.policies.storage, "upsert chunks", || {
                self.store.upsert_documents(&chunks, !integrated)
            })
            .await?
        };

        self.write_manifest(&document, &pages, &chunks).await?;
        Ok((upserted, warnings))
    }

    /// Split a paginated document and extract pages in parallel under
    /// the page-level semaphore.
    async fn extract_paginated(
        &self,
        sourcefile: &str,
        bytes: &[u8],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<(PageMetadata, ExtractedPage)>> {
        let page_docs = self.splitter.split(sourcefile, bytes)?;

        let mut tasks = Vec::with_capacity(page_docs.len());
        for (i, page_bytes) in page_docs.into_iter().enumerate() {
            let page_num = i as u32 + 1;
            let orchestrator = self.clone();
            let sourcefile = sourcefile.to_string();

            tasks.push(tokio::spawn(async move {
                let _permit = orchestrator.limits.acquire_page().await;

                let page_path = layout::page(&sourcefile, page_num, "pdf");
                let upload = retry(orchestrator.policies.storage, "upload page", || {
                    orchestrator.artifacts.upload(&page_path, page_bytes.clone())
                })
                .await;
                let page_blob_url = match upload {
                    Ok(url) => Some(url),
                    Err(e) => return (page_num, Err(e)),
                };

                let extractor = match orchestrator.extractors.resolve(&sourcefile) {
                    Ok(e) => e,
                    Err(e) => return (page_num, Err(e)),
                };
                let extracted = retry(orchestrator.policies.extraction, "extract page", || {
                    extractor.extract_page(page_num, &page_bytes)
                })
                .await;

                let result = extracted.map(|page| {
                    let meta = PageMetadata::new(&sourcefile, page_num, page_blob_url);
                    (meta, page)
                });
                (page_num, result)
            }));
        }

        let mut extracted: Vec<(u32, Result<(PageMetadata, ExtractedPage)>)> = Vec::new();
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(item) => extracted.push(item),
                Err(e) => {
                    return Err(IngestError::Extract(ExtractError::Malformed(format!(
                        "page task panicked: {}",
                        e
                    ))))
                }
            }
        }
        extracted.sort_by_key(|(page_num, _)| *page_num);

        let tolerant = self.config.extraction.partial_page_tolerance;
        let mut pages = Vec::new();
        for (page_num, result) in extracted {
            match result {
                Ok(pair) => pages.push(pair),
                Err(e) if tolerant => {
                    warn!("Page {} of {} failed: {}", page_num, sourcefile, e);
                    warnings.push(format!("page {} failed: {}", page_num, e));
                }
                Err(e) => {
                    return Err(ExtractError::Page {
                        page: page_num,
                        reason: e.to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(pages)
    }

    /// Upload figure bytes and describe them, one document at a time
    async fn enrich_images(
        &self,
        sourcefile: &str,
        pages: &mut [(PageMetadata, ExtractedPage)],
        warnings: &mut Vec<String>,
    ) {
        let has_images = pages.iter().any(|(_, p)| !p.images.is_empty());
        if !has_images {
            return;
        }

        let _permit = self.limits.acquire_vision().await;
        for (_, page) in pages.iter_mut() {
            if page.images.is_empty() {
                continue;
            }

            let page_text = page.text.clone();
            if let Err(e) = self.describer.describe(&mut page.images, &page_text).await {
                warn!("Describer failed on {}: {}", sourcefile, e);
                warnings.push(format!("figure description failed: {}", e));
            }

            for image in page.images.iter_mut() {
                let Some(bytes) = image.image_bytes.clone() else {
                    continue;
                };
                let figure_path = layout::figure(sourcefile, &image.figure_id, "png");
                match retry(self.policies.storage, "upload figure", || {
                    self.artifacts.upload(&figure_path, bytes.clone())
                })
                .await
                {
                    Ok(url) => {
                        image.figure_url = Some(url);
                        image.image_bytes = None;
                    }
                    Err(e) => {
                        warn!("Figure {} upload failed: {}", image.figure_id, e);
                        warnings.push(format!("figure {} upload failed", image.figure_id));
                    }
                }
            }
        }
    }

    /// Embed all chunks, batch-parallel under the embed semaphore.
    ///
    /// Batches may finish out of order; vectors are reassembled in
    /// chunk order before the upsert. Any failed batch fails the
    /// document.
    async fn embed_chunks(&self, chunks: &mut [ChunkDocument]) -> Result<()> {
        let token_counts: Vec<usize> = chunks.iter().map(|c| c.token_count).collect();
        let batches = plan_batches(&token_counts, &self.provider.batch_limits());

        let mut tasks = Vec::with_capacity(batches.len());
        for (batch_idx, range) in batches.into_iter().enumerate() {
            let texts: Vec<String> = chunks[range.clone()].iter().map(|c| c.text.clone()).collect();
            let orchestrator = self.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = orchestrator.limits.acquire_embed().await;
                let vectors = retry(orchestrator.policies.embeddings, "embed batch", || {
                    orchestrator.provider.embed_batch(&texts)
                })
                .await;
                (batch_idx, range, vectors)
            }));
        }

        let mut results: Vec<(usize, std::ops::Range<usize>, Vec<Vec<f32>>)> = Vec::new();
        for joined in futures::future::join_all(tasks).await {
            let (batch_idx, range, vectors) = joined.map_err(|e| {
                IngestError::Embed(EmbedError::Api(format!("embed task panicked: {}", e)))
            })?;
            results.push((batch_idx, range, vectors?));
        }
        results.sort_by_key(|(batch_idx, _, _)| *batch_idx);

        let expected_dims = self.provider.dimensions();
        for (_, range, vectors) in results {
            if vectors.len() != range.len() {
                return Err(EmbedError::Shape {
                    sent: range.len(),
                    received: vectors.len(),
                }
                .into());
            }
            for (chunk, vector) in chunks[range].iter_mut().zip(vectors) {
                if vector.len() != expected_dims {
                    return Err(EmbedError::Api(format!(
                        "provider returned {}-dim vector, expected {}",
                        vector.len(),
                        expected_dims
                    ))
                    .into());
                }
                chunk.embedding = Some(vector);
            }
        }
        Ok(())
    }

    async fn write_manifest(
        &self,
        document: &DocumentMetadata,
        pages: &[(PageMetadata, ExtractedPage)],
        chunks: &[ChunkDocument],
    ) -> Result<()> {
        let manifest = DocumentManifest {
            document,
            pages: pages.iter().map(|(meta, _)| meta).collect(),
            chunk_ids: chunks.iter().map(|c| c.chunk_id.as_str()).collect(),
            indexed_at: now_iso(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)?;

        let path = layout::manifest(&document.sourcefile);
        retry(self.policies.storage, "write manifest", || {
            self.artifacts.upload(&path, bytes.clone())
        })
        .await?;
        Ok(())
    }

    /// REMOVE mode: delete chunks (and optionally artifacts) per file
    async fn run_remove(&self) -> Result<Vec<IngestionResult>> {
        let files = retry(self.policies.storage, "list input", || self.input.list()).await?;

        let mut results = Vec::with_capacity(files.len());
        for file_id in files {
            let started = Instant::now();
            let sourcefile = file_id.rsplit('/').next().unwrap_or(&file_id).to_string();

            let outcome = self.remove_document(&sourcefile).await;
            results.push(match outcome {
                Ok(deleted) => {
                    info!("Removed {} chunks for {}", deleted, sourcefile);
                    IngestionResult::ok(&sourcefile, 0, Vec::new(), started.elapsed().as_secs_f64())
                }
                Err(e) => IngestionResult::failed(
                    &sourcefile,
                    e.kind(),
                    &e.to_string(),
                    started.elapsed().as_secs_f64(),
                ),
            });
        }
        Ok(results)
    }

    async fn remove_document(&self, sourcefile: &str) -> Result<usize> {
        let deleted = retry(self.policies.storage, "delete chunks", || {
            self.store.delete_by_sourcefile(sourcefile)
        })
        .await?;

        if self.config.action.cleanup_artifacts {
            self.artifacts.delete(&layout::document(sourcefile)).await?;
            let prefix = format!("{}/", layout::stem(sourcefile));
            artifact::delete_prefix(self.artifacts.as_ref(), &prefix).await?;
        }
        Ok(deleted)
    }

    /// REMOVE_ALL mode: drain the whole index
    async fn run_remove_all(&self) -> Result<()> {
        let deleted = retry(self.policies.storage, "delete all chunks", || {
            self.store.delete_all()
        })
        .await?;
        info!("Removed all {} chunks from the store", deleted);

        if self.config.action.cleanup_artifacts {
            let removed = artifact::delete_prefix(self.artifacts.as_ref(), "").await?;
            info!("Removed {} artifacts", removed);
        }
        Ok(())
    }

    /// Persist the run summary; a failure here is logged, not fatal
    async fn persist_summary(&self, status: &PipelineStatus) {
        let summary = RunSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            config_fingerprint: self.config.fingerprint(),
            status: status.clone(),
        };

        let path = layout::run_status(&status.started_at.replace(':', "-"));
        let bytes = match serde_json::to_vec_pretty(&summary) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not serialize run summary: {}", e);
                return;
            }
        };

        let result = retry(self.policies.storage, "write run summary", || {
            self.artifacts.upload(&path, bytes.clone())
        })
        .await;
        if let Err(e) = result {
            warn!("Could not persist run summary: {}", e);
        }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso_shape() {
        let ts = now_iso();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
    }
}
