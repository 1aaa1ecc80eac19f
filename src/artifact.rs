//! Artifact storage: full documents, page PDFs, figures, manifests,
//! and run summaries

use crate::config::ObjectStoreConfig;
use crate::error::{IngestError, Result};
use crate::http::{bearer_headers, HttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Artifact path layout helpers.
///
/// All stores share one namespace:
///   documents/{sourcefile}            full document
///   {stem}/page-{NNNN}.{ext}          per-page artifact
///   {stem}/figure_{figure_id}.{ext}   extracted figure
///   {stem}/manifest.json              per-document manifest
///   status/run-{ISO8601}.json         run summary
pub mod layout {
    /// Stem of a filename: the name without its final extension
    pub fn stem(sourcefile: &str) -> String {
        match sourcefile.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => sourcefile.to_string(),
        }
    }

    pub fn document(sourcefile: &str) -> String {
        format!("documents/{}", sourcefile)
    }

    pub fn page(sourcefile: &str, page_num: u32, ext: &str) -> String {
        format!("{}/page-{:04}.{}", stem(sourcefile), page_num, ext)
    }

    pub fn figure(sourcefile: &str, figure_id: &str, ext: &str) -> String {
        format!("{}/figure_{}.{}", stem(sourcefile), figure_id, ext)
    }

    pub fn manifest(sourcefile: &str) -> String {
        format!("{}/manifest.json", stem(sourcefile))
    }

    pub fn run_status(timestamp: &str) -> String {
        format!("status/run-{}.json", timestamp)
    }
}

/// Durable sink for pipeline artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes under a layout path, returning a stable URL
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String>;

    /// List stored paths under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete one stored path
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Delete everything under a prefix; shared by the cleanup flows
pub async fn delete_prefix(store: &dyn ArtifactStore, prefix: &str) -> Result<usize> {
    let paths = store.list(prefix).await?;
    let count = paths.len();
    for path in paths {
        store.delete(&path).await?;
    }
    Ok(count)
}

/// Filesystem-backed artifact store
pub struct LocalArtifactStore {
    base_dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(base_dir: &str) -> Self {
        Self {
            base_dir: PathBuf::from(base_dir),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        let url = format!("file://{}", full.display());
        debug!("Stored artifact {}", url);
        Ok(url)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let root = self.base_dir.clone();
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&root) {
                    let rel = rel.to_string_lossy().replace('\\', "/");
                    if rel.starts_with(prefix) {
                        found.push(rel);
                    }
                }
            }
        }

        found.sort();
        Ok(found)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobListing {
    blobs: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
struct BlobEntry {
    name: String,
}

/// Artifact store over a REST blob API
pub struct ObjectStoreArtifactStore {
    client: HttpClient,
    config: ObjectStoreConfig,
}

impl ObjectStoreArtifactStore {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            client: HttpClient::new(config.timeout),
            config,
        }
    }

    fn blob_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.container,
            path
        )
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        bearer_headers(self.config.auth_token.as_deref())
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreArtifactStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let url = self.blob_url(path);
        self.client
            .put_bytes(&url, bytes, &self.headers())
            .await
            .map_err(|e| match e {
                e if e.is_transient() => IngestError::ArtifactStoreDown(e.to_string()),
                e => e,
            })?;
        info!("Uploaded artifact {}", url);
        Ok(url)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}?prefix={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.container,
            prefix
        );
        let listing: BlobListing = self
            .client
            .get_json(&url, &self.headers())
            .await
            .map_err(|e| match e {
                e if e.is_transient() => IngestError::ArtifactStoreDown(e.to_string()),
                e => e,
            })?;
        Ok(listing.blobs.into_iter().map(|b| b.name).collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.blob_url(path);
        self.client.delete(&url, &self.headers()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        assert_eq!(layout::document("report.pdf"), "documents/report.pdf");
        assert_eq!(layout::page("report.pdf", 7, "pdf"), "report/page-0007.pdf");
        assert_eq!(
            layout::figure("report.pdf", "fig2", "png"),
            "report/figure_fig2.png"
        );
        assert_eq!(layout::manifest("report.pdf"), "report/manifest.json");
        assert_eq!(
            layout::run_status("2025-06-01T12:00:00Z"),
            "status/run-2025-06-01T12:00:00Z.json"
        );
    }

    #[test]
    fn test_stem_without_extension() {
        assert_eq!(layout::stem("notes"), "notes");
        assert_eq!(layout::stem("archive.tar.gz"), "archive.tar");
        assert_eq!(layout::stem(".hidden"), ".hidden");
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(&dir.path().to_string_lossy());

        let url = store
            .upload("documents/a.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert!(url.starts_with("file://"));

        store.upload("a/page-0001.pdf", vec![1, 2]).await.unwrap();
        store.upload("a/page-0002.pdf", vec![3, 4]).await.unwrap();

        let pages = store.list("a/page-").await.unwrap();
        assert_eq!(pages, vec!["a/page-0001.pdf", "a/page-0002.pdf"]);

        store.delete("a/page-0001.pdf").await.unwrap();
        let pages = store.list("a/page-").await.unwrap();
        assert_eq!(pages, vec!["a/page-0002.pdf"]);

        // Deleting a missing path is not an error
        store.delete("a/page-0001.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(&dir.path().to_string_lossy());

        store.upload("doc/x.bin", vec![0]).await.unwrap();
        store.upload("doc/y.bin", vec![0]).await.unwrap();
        store.upload("other/z.bin", vec![0]).await.unwrap();

        let deleted = delete_prefix(&store, "doc/").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.list("doc/").await.unwrap().len(), 0);
        assert_eq!(store.list("other/").await.unwrap().len(), 1);
    }
}
