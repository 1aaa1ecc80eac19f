//! Text-family extractor

use super::Extractor;
use crate::error::Result;
use crate::types::ExtractedPage;
use async_trait::async_trait;
use tracing::debug;

/// Extractor for plain-text formats.
///
/// Form feeds (`\x0c`) delimit pages; files without them produce a
/// single page. Text pages carry no tables or images.
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    fn split_pages(content: &str) -> Vec<ExtractedPage> {
        let raw_pages: Vec<&str> = content.split('\u{0c}').collect();

        let mut pages = Vec::new();
        let mut page_num = 0u32;
        for raw in raw_pages {
            if raw.trim().is_empty() {
                continue;
            }
            page_num += 1;
            pages.push(ExtractedPage::new(page_num, raw.trim_matches('\n')));
        }
        pages
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
        let content = String::from_utf8_lossy(bytes);
        let pages = Self::split_pages(&content);
        debug!("Extracted {} text pages from {}", pages.len(), filename);
        Ok(pages)
    }

    async fn extract_page(&self, page_num: u32, bytes: &[u8]) -> Result<ExtractedPage> {
        let content = String::from_utf8_lossy(bytes);
        Ok(ExtractedPage::new(page_num, content.trim_matches('\n')))
    }

    fn paginated(&self) -> bool {
        false
    }
}
