//! Core data model for the ingestion pipeline

use serde::{Deserialize, Serialize};

/// Identity and provenance of one source document.
///
/// Created once when ingestion of the document starts, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Stable identity of the source, used for citations and deletion
    pub sourcefile: String,
    /// URL of the full document in the artifact store
    pub storage_url: String,
    /// Hex MD5 digest of the raw bytes
    pub md5_hash: String,
    /// Raw byte count
    pub file_size: u64,
}

impl DocumentMetadata {
    pub fn new(sourcefile: &str, storage_url: &str, bytes: &[u8]) -> Self {
        Self {
            sourcefile: sourcefile.to_string(),
            storage_url: storage_url.to_string(),
            md5_hash: format!("{:x}", md5::compute(bytes)),
            file_size: bytes.len() as u64,
        }
    }
}

/// Per-page identity within a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    /// 1-based page number
    pub page_num: u32,
    /// Citation identifier, includes the page anchor
    pub sourcepage: String,
    /// URL of the per-page artifact (None for non-paginated formats)
    pub page_blob_url: Option<String>,
}

impl PageMetadata {
    pub fn new(sourcefile: &str, page_num: u32, page_blob_url: Option<String>) -> Self {
        Self {
            page_num,
            sourcepage: format!("{}#page={}", sourcefile, page_num),
            page_blob_url,
        }
    }
}

/// One cell of an extracted table, positioned on the grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCell {
    pub row: u32,
    pub col: u32,
    #[serde(default = "default_span")]
    pub row_span: u32,
    #[serde(default = "default_span")]
    pub col_span: u32,
    pub text: String,
}

fn default_span() -> u32 {
    1
}

impl TableCell {
    pub fn new(row: u32, col: u32, text: &str) -> Self {
        Self {
            row,
            col,
            row_span: 1,
            col_span: 1,
            text: text.to_string(),
        }
    }

    pub fn with_span(mut self, row_span: u32, col_span: u32) -> Self {
        self.row_span = row_span;
        self.col_span = col_span;
        self
    }
}

/// A table extracted from a page, anchored at a byte offset in the page text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub table_id: String,
    pub row_count: u32,
    pub col_count: u32,
    /// Cells in reading order; merged cells appear once at their origin
    pub cells: Vec<TableCell>,
    pub caption: Option<String>,
    /// Byte offset into the page text where the table anchors
    pub offset: usize,
    /// Filled in by the table renderer during enrichment
    pub rendered_text: Option<String>,
    /// Token count of rendered_text, computed after rendering
    pub token_count: usize,
}

impl ExtractedTable {
    pub fn new(table_id: &str, row_count: u32, col_count: u32, cells: Vec<TableCell>) -> Self {
        Self {
            table_id: table_id.to_string(),
            row_count,
            col_count,
            cells,
            caption: None,
            offset: 0,
            rendered_text: None,
            token_count: 0,
        }
    }

    pub fn with_caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// An image extracted from a page.
///
/// After artifact upload, exactly one of `image_bytes` / `figure_url`
/// is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub page_num: u32,
    pub figure_id: String,
    /// Bounding box (x, y, width, height) in page units when known
    pub bbox: Option<[f32; 4]>,
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_bytes: Option<Vec<u8>>,
    pub figure_url: Option<String>,
    /// Byte offset into the page text where the figure anchors
    pub offset: usize,
    /// Filled in by the media describer; empty when describing is disabled
    pub description: String,
    /// Text recognized inside the image, when the describer reports any
    pub ocr_text: Option<String>,
}

impl ExtractedImage {
    pub fn new(page_num: u32, figure_id: &str, image_bytes: Vec<u8>) -> Self {
        Self {
            page_num,
            figure_id: figure_id.to_string(),
            bbox: None,
            caption: None,
            image_bytes: Some(image_bytes),
            figure_url: None,
            offset: 0,
            description: String::new(),
            ocr_text: None,
        }
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One extracted page: text plus anchored tables and images.
///
/// The page text together with every table's rendered_text and every
/// image's description forms the enriched page text the chunker
/// operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_num: u32,
    pub text: String,
    pub tables: Vec<ExtractedTable>,
    pub images: Vec<ExtractedImage>,
}

impl ExtractedPage {
    pub fn new(page_num: u32, text: &str) -> Self {
        Self {
            page_num,
            text: text.to_string(),
            tables: Vec::new(),
            images: Vec::new(),
        }
    }
}

/// A bounded, indexable unit of enriched text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDocument {
    pub document: DocumentMetadata,
    pub page: PageMetadata,
    /// "{sourcefile}_p{page}_c{index}", unique within a run
    pub chunk_id: String,
    pub text: String,
    pub token_count: usize,
    /// None iff integrated vectorization computes vectors server-side
    pub embedding: Option<Vec<f32>>,
    /// Ids of tables fully contained in this chunk
    pub tables: Vec<String>,
    /// Ids of figures fully contained in this chunk
    pub figures: Vec<String>,
}

/// Terminal outcome for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub filename: String,
    pub success: bool,
    pub chunks_indexed: usize,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub processing_time_seconds: f64,
}

impl IngestionResult {
    pub fn ok(filename: &str, chunks_indexed: usize, warnings: Vec<String>, secs: f64) -> Self {
        Self {
            filename: filename.to_string(),
            success: true,
            chunks_indexed,
            error_kind: None,
            error_message: None,
            warnings,
            processing_time_seconds: secs,
        }
    }

    pub fn failed(filename: &str, kind: &str, message: &str, secs: f64) -> Self {
        Self {
            filename: filename.to_string(),
            success: false,
            chunks_indexed: 0,
            error_kind: Some(kind.to_string()),
            error_message: Some(message.to_string()),
            warnings: Vec::new(),
            processing_time_seconds: secs,
        }
    }
}

/// Aggregate outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub started_at: String,
    pub finished_at: String,
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<IngestionResult>,
}

impl PipelineStatus {
    pub fn success_rate(&self) -> f64 {
        if self.total_documents == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total_documents as f64
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Run summary persisted to the artifact store as status/run-*.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub config_fingerprint: String,
    #[serde(flatten)]
    pub status: PipelineStatus,
}

/// What the pipeline does with matched documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentAction {
    /// Process each file; prior chunks for the same sourcefile are replaced
    Add,
    /// Delete chunks (and optionally artifacts) for matched files
    Remove,
    /// Delete every chunk in the store, optionally all artifacts
    RemoveAll,
}

impl Default for DocumentAction {
    fn default() -> Self {
        DocumentAction::Add
    }
}

impl std::fmt::Display for DocumentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentAction::Add => write!(f, "add"),
            DocumentAction::Remove => write!(f, "remove"),
            DocumentAction::RemoveAll => write!(f, "remove_all"),
        }
    }
}

impl std::str::FromStr for DocumentAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(DocumentAction::Add),
            "remove" => Ok(DocumentAction::Remove),
            "remove_all" => Ok(DocumentAction::RemoveAll),
            _ => Err(format!("Unknown document action: {}", s)),
        }
    }
}

/// A search hit returned by a vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub sourcefile: String,
    pub sourcepage: String,
    pub text: String,
    pub score: f32,
}
