//! Document extraction: bytes in, ordered pages out

pub mod pdf;
pub mod text;

pub use pdf::{PagePdfSplitter, PdfExtractor};
pub use text::TextExtractor;

use crate::config::ExtractorMode;
use crate::error::{IngestError, Result};
use crate::types::ExtractedPage;
use async_trait::async_trait;
use std::path::Path;

/// Turns document bytes into an ordered sequence of extracted pages
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract every page of a document
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>>;

    /// Extract one page from its standalone single-page document.
    ///
    /// Only meaningful for paginated formats; drives the page-level
    /// fan-out in the orchestrator.
    async fn extract_page(&self, page_num: u32, bytes: &[u8]) -> Result<ExtractedPage>;

    /// Whether the format splits into per-page documents
    fn paginated(&self) -> bool;
}

/// Resolves the extractor responsible for a file
pub trait ExtractorResolver: Send + Sync {
    /// Pick the extractor for a filename, or fail as unsupported
    fn resolve(&self, filename: &str) -> Result<&dyn Extractor>;
}

/// Picks the extractor for a file based on the configured mode
pub struct ExtractorRegistry {
    mode: ExtractorMode,
    text: TextExtractor,
    pdf: PdfExtractor,
}

/// Extensions the text adapter accepts in auto mode
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "html", "htm", "csv", "json", "yaml", "yml", "toml", "xml", "rst",
    "log",
];

impl ExtractorRegistry {
    pub fn new(mode: ExtractorMode) -> Self {
        Self {
            mode,
            text: TextExtractor::new(),
            pdf: PdfExtractor::new(),
        }
    }

    fn extension(filename: &str) -> String {
        Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    fn resolve_inner(&self, filename: &str) -> Result<&dyn Extractor> {
        let ext = Self::extension(filename);
        match self.mode {
            ExtractorMode::Text => Ok(&self.text),
            ExtractorMode::Pdf => {
                if ext == "pdf" {
                    Ok(&self.pdf)
                } else {
                    Err(IngestError::UnsupportedFormat(filename.to_string()))
                }
            }
            ExtractorMode::Auto => {
                if ext == "pdf" {
                    Ok(&self.pdf)
                } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
                    Ok(&self.text)
                } else {
                    Err(IngestError::UnsupportedFormat(filename.to_string()))
                }
            }
        }
    }
}

impl ExtractorResolver for ExtractorRegistry {
    fn resolve(&self, filename: &str) -> Result<&dyn Extractor> {
        self.resolve_inner(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolution() {
        let registry = ExtractorRegistry::new(ExtractorMode::Auto);
        assert!(!registry.resolve("notes.md").unwrap().paginated());
        assert!(registry.resolve("report.pdf").unwrap().paginated());
        assert!(matches!(
            registry.resolve("binary.exe"),
            Err(IngestError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_pdf_mode_rejects_text() {
        let registry = ExtractorRegistry::new(ExtractorMode::Pdf);
        assert!(registry.resolve("report.pdf").is_ok());
        assert!(registry.resolve("notes.txt").is_err());
    }

    #[test]
    fn test_text_mode_accepts_anything() {
        let registry = ExtractorRegistry::new(ExtractorMode::Text);
        assert!(registry.resolve("weird.bin").is_ok());
    }
}
