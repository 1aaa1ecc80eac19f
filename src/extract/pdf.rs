//! PDF extractor and per-page splitter

use super::Extractor;
use crate::error::{ExtractError, Result};
use crate::types::ExtractedPage;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Extractor for PDF documents.
///
/// Extraction is text-only; scanned-image PDFs yield empty pages rather
/// than an error.
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
        let page_texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::Malformed(format!("{}: {}", filename, e)))?;

        let pages: Vec<ExtractedPage> = page_texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| ExtractedPage::new(i as u32 + 1, text.trim_matches('\n')))
            .collect();

        debug!("Extracted {} PDF pages from {}", pages.len(), filename);
        Ok(pages)
    }

    async fn extract_page(&self, page_num: u32, bytes: &[u8]) -> Result<ExtractedPage> {
        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Page {
            page: page_num,
            reason: e.to_string(),
        })?;
        Ok(ExtractedPage::new(page_num, text.trim_matches('\n')))
    }

    fn paginated(&self) -> bool {
        true
    }
}

/// Splits a PDF into standalone single-page documents
pub struct PagePdfSplitter;

impl PagePdfSplitter {
    pub fn new() -> Self {
        Self
    }

    /// Produce one single-page PDF per page, in page order
    pub fn split(&self, filename: &str, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| ExtractError::Malformed(format!("{}: {}", filename, e)))?;

        let page_count = document.get_pages().len() as u32;
        if page_count == 0 {
            return Err(ExtractError::Malformed(format!("{}: no pages", filename)).into());
        }

        let mut page_docs = Vec::with_capacity(page_count as usize);
        for keep in 1..=page_count {
            let mut single = document.clone();
            let others: Vec<u32> = (1..=page_count).filter(|&n| n != keep).collect();
            single.delete_pages(&others);
            single.prune_objects();

            let mut out = Vec::new();
            if let Err(e) = single.save_to(&mut out) {
                warn!("Failed to serialize page {} of {}: {}", keep, filename, e);
                return Err(ExtractError::Page {
                    page: keep,
                    reason: e.to_string(),
                }
                .into());
            }
            page_docs.push(out);
        }

        debug!("Split {} into {} page documents", filename, page_docs.len());
        Ok(page_docs)
    }
}

impl Default for PagePdfSplitter {
    fn default() -> Self {
        Self::new()
    }
}
