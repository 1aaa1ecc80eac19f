//! Shared fakes and fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use docpipe::{
    ChunkDocument, EmbeddingsProvider, ExtractError, ExtractedPage, Extractor, ExtractorResolver,
    IngestError, InputSource, Orchestrator, PdfExtractor, PipelineConfig, Result, RetryPolicies,
    RetryPolicy, SearchHit, SearchQuery, SourceDocument, VectorStore,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory input source
pub struct FakeInputSource {
    files: BTreeMap<String, Vec<u8>>,
}

impl FakeInputSource {
    pub fn new(files: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(name, bytes)| (name.to_string(), bytes))
                .collect(),
        }
    }
}

#[async_trait]
impl InputSource for FakeInputSource {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    async fn read(&self, file_id: &str) -> Result<SourceDocument> {
        let bytes = self
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| IngestError::ConfigInvalid(format!("no such file: {}", file_id)))?;
        Ok(SourceDocument {
            filename: file_id.to_string(),
            bytes,
            source_url: format!("fake://{}", file_id),
        })
    }
}

/// Deterministic embedding provider.
///
/// Every vector is filled with the input's byte length, so tests can
/// verify order preservation end to end. Records batch sizes and can
/// fail the first N calls with a transient error.
pub struct FakeEmbeddings {
    dims: usize,
    max_seq_length: usize,
    pub batch_sizes: Mutex<Vec<usize>>,
    fail_remaining: AtomicUsize,
}

impl FakeEmbeddings {
    pub fn new(dims: usize, max_seq_length: usize) -> Self {
        Self {
            dims,
            max_seq_length,
            batch_sizes: Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, times: usize) {
        self.fail_remaining.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingsProvider for FakeEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32; self.dims])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(IngestError::TransientNetwork("injected failure".into()));
        }
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| vec![t.len() as f32; self.dims]).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    fn max_seq_length(&self) -> Option<usize> {
        Some(self.max_seq_length)
    }

    fn batch_limits(&self) -> docpipe::BatchLimits {
        docpipe::BatchLimits {
            max_inputs: 16,
            max_total_tokens: 100_000,
        }
    }
}

/// In-memory vector store keyed by chunk_id
#[derive(Default)]
pub struct FakeVectorStore {
    pub chunks: Mutex<HashMap<String, ChunkDocument>>,
    dims: usize,
    integrated: bool,
}

impl FakeVectorStore {
    pub fn new(dims: usize) -> Self {
        Self {
            chunks: Mutex::new(HashMap::new()),
            dims,
            integrated: false,
        }
    }

    pub fn with_integrated(mut self) -> Self {
        self.integrated = true;
        self
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chunks.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, chunk_id: &str) -> Option<ChunkDocument> {
        self.chunks.lock().unwrap().get(chunk_id).cloned()
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn upsert_documents(
        &self,
        chunks: &[ChunkDocument],
        include_embeddings: bool,
    ) -> Result<usize> {
        if !include_embeddings && !self.integrated {
            return Err(IngestError::ConfigInvalid(
                "fake store cannot vectorize server-side".into(),
            ));
        }
        let mut stored = self.chunks.lock().unwrap();
        for chunk in chunks {
            stored.insert(chunk.chunk_id.clone(), chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn delete_by_sourcefile(&self, sourcefile: &str) -> Result<usize> {
        let mut stored = self.chunks.lock().unwrap();
        let before = stored.len();
        stored.retain(|_, c| c.document.sourcefile != sourcefile);
        Ok(before - stored.len())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut stored = self.chunks.lock().unwrap();
        let n = stored.len();
        stored.clear();
        Ok(n)
    }

    async fn search(
        &self,
        _query: &SearchQuery,
        _top_k: usize,
        _filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn supports_integrated_vectorization(&self) -> bool {
        self.integrated
    }
}

/// Resolver that hands every file to one extractor
pub struct FixedResolver {
    extractor: Arc<dyn Extractor>,
}

impl FixedResolver {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }
}

impl ExtractorResolver for FixedResolver {
    fn resolve(&self, _filename: &str) -> Result<&dyn Extractor> {
        Ok(self.extractor.as_ref())
    }
}

/// PDF extractor that fails one page with a transient error
pub struct FlakyPageExtractor {
    inner: PdfExtractor,
    fail_page: u32,
}

impl FlakyPageExtractor {
    pub fn new(fail_page: u32) -> Self {
        Self {
            inner: PdfExtractor::new(),
            fail_page,
        }
    }
}

#[async_trait]
impl Extractor for FlakyPageExtractor {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
        self.inner.extract(filename, bytes).await
    }

    async fn extract_page(&self, page_num: u32, bytes: &[u8]) -> Result<ExtractedPage> {
        if page_num == self.fail_page {
            return Err(IngestError::TransientNetwork(format!(
                "injected failure on page {}",
                page_num
            )));
        }
        self.inner.extract_page(page_num, bytes).await
    }

    fn paginated(&self) -> bool {
        true
    }
}

/// Non-paginated extractor that tracks its peak concurrency
pub struct CountingExtractor {
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl CountingExtractor {
    pub fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Extractor for CountingExtractor {
    async fn extract(&self, _filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let text = String::from_utf8_lossy(bytes).to_string();
        Ok(vec![ExtractedPage::new(1, &text)])
    }

    async fn extract_page(&self, page_num: u32, _bytes: &[u8]) -> Result<ExtractedPage> {
        Err(ExtractError::Page {
            page: page_num,
            reason: "not paginated".into(),
        }
        .into())
    }

    fn paginated(&self) -> bool {
        false
    }
}

/// Extractor returning prebuilt pages regardless of input
pub struct CannedExtractor {
    pages: Vec<ExtractedPage>,
}

impl CannedExtractor {
    pub fn new(pages: Vec<ExtractedPage>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl Extractor for CannedExtractor {
    async fn extract(&self, _filename: &str, _bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
        Ok(self.pages.clone())
    }

    async fn extract_page(&self, page_num: u32, _bytes: &[u8]) -> Result<ExtractedPage> {
        self.pages
            .iter()
            .find(|p| p.page_num == page_num)
            .cloned()
            .ok_or_else(|| {
                ExtractError::Page {
                    page: page_num,
                    reason: "no such page".into(),
                }
                .into()
            })
    }

    fn paginated(&self) -> bool {
        false
    }
}

/// Millisecond-scale retry policies so failure tests stay fast
pub fn fast_policies() -> RetryPolicies {
    let fast = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
    RetryPolicies {
        storage: fast,
        extraction: fast,
        embeddings: fast,
    }
}

/// Assemble a multi-page PDF with one line of text per page
pub fn make_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut page_ids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => page_ids.len() as u32,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Standard test rig: fake input/provider/store, local artifacts in a
/// temp dir, 4-chars-per-token counting, fast retries.
pub struct TestRig {
    pub orchestrator: Orchestrator,
    pub provider: Arc<FakeEmbeddings>,
    pub store: Arc<FakeVectorStore>,
    pub artifacts_dir: tempfile::TempDir,
}

pub fn build_rig(
    config: PipelineConfig,
    files: Vec<(&str, Vec<u8>)>,
    provider: FakeEmbeddings,
) -> TestRig {
    let artifacts_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(provider);
    let store = Arc::new(FakeVectorStore::new(provider.dimensions()));

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(FakeInputSource::new(files)),
        Arc::new(docpipe::LocalArtifactStore::new(
            &artifacts_dir.path().to_string_lossy(),
        )),
        Arc::new(docpipe::DisabledDescriber),
        Arc::new(docpipe::CharacterTokenCounter::new(4)),
        provider.clone(),
        store.clone(),
    )
    .with_retry_policies(fast_policies());

    TestRig {
        orchestrator,
        provider,
        store,
        artifacts_dir,
    }
}
