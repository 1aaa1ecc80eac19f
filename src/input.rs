//! Input sources: where source documents are discovered and read

use crate::config::ObjectStoreConfig;
use crate::error::{IngestError, Result};
use crate::http::{bearer_headers, HttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A document read from an input source
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Base name, used as the sourcefile identity
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Where the document came from
    pub source_url: String,
}

/// Enumerates and reads source documents
#[async_trait]
pub trait InputSource: Send + Sync {
    /// List file identifiers matching the configured selection
    async fn list(&self) -> Result<Vec<String>>;

    /// Read one file by identifier
    async fn read(&self, file_id: &str) -> Result<SourceDocument>;
}

/// Filesystem input selected by a glob pattern
pub struct LocalInputSource {
    pattern: String,
}

impl LocalInputSource {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }
}

#[async_trait]
impl InputSource for LocalInputSource {
    async fn list(&self) -> Result<Vec<String>> {
        let paths = glob::glob(&self.pattern)
            .map_err(|e| IngestError::ConfigInvalid(format!("invalid glob pattern: {}", e)))?;

        let mut files: Vec<String> = paths
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        files.sort();

        info!("Discovered {} files matching {}", files.len(), self.pattern);
        Ok(files)
    }

    async fn read(&self, file_id: &str) -> Result<SourceDocument> {
        let path = PathBuf::from(file_id);
        let bytes = tokio::fs::read(&path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| IngestError::ConfigInvalid(format!("not a file path: {}", file_id)))?;

        debug!("Read {} ({} bytes)", file_id, bytes.len());
        Ok(SourceDocument {
            filename,
            bytes,
            source_url: format!("file://{}", absolute(&path).display()),
        })
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Listing shape returned by the REST object store
#[derive(Debug, Deserialize)]
struct BlobListing {
    blobs: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
struct BlobEntry {
    name: String,
}

/// Object-store input over a REST blob API
pub struct ObjectStoreInputSource {
    client: HttpClient,
    config: ObjectStoreConfig,
}

impl ObjectStoreInputSource {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            client: HttpClient::new(config.timeout),
            config,
        }
    }

    fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.container,
            name
        )
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        bearer_headers(self.config.auth_token.as_deref())
    }
}

#[async_trait]
impl InputSource for ObjectStoreInputSource {
    async fn list(&self) -> Result<Vec<String>> {
        let mut url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.container
        );
        if let Some(prefix) = &self.config.prefix {
            url = format!("{}?prefix={}", url, prefix);
        }

        let listing: BlobListing = self.client.get_json(&url, &self.headers()).await?;

        let mut names: Vec<String> = listing
            .blobs
            .into_iter()
            .map(|b| b.name)
            .filter(|name| match &self.config.filter {
                Some(f) => name.contains(f.as_str()),
                None => true,
            })
            .collect();
        names.sort();

        info!(
            "Discovered {} blobs in {}/{}",
            names.len(),
            self.config.base_url,
            self.config.container
        );
        Ok(names)
    }

    async fn read(&self, file_id: &str) -> Result<SourceDocument> {
        let url = self.blob_url(file_id);
        let bytes = self.client.get_bytes(&url, &self.headers()).await?;

        let filename = file_id
            .rsplit('/')
            .next()
            .unwrap_or(file_id)
            .to_string();

        debug!("Downloaded {} ({} bytes)", file_id, bytes.len());
        Ok(SourceDocument {
            filename,
            bytes,
            source_url: url,
        })
    }
}
