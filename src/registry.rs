use async_trait::async_trait;
use bytes::Bytes;

pub use depot_core::{Entry, FeedQuery, Page};

use crate::access::AccessTier;
use crate::error::Result;

pub mod fs;

/// File contents and the content type to serve them with
#[derive(Debug, Clone)]
pub struct FileContent {
    pub data: Bytes,
    pub content_type: &'static str,
}

/// Registry trait for package storage backends
#[async_trait]
pub trait Registry: Send + Sync {
    /// Store a new archive. Fails with `AlreadyExists` if its id and
    /// version are already present.
    async fn store(&self, archive: Bytes) -> Result<Entry>;

    /// Remove a package by filename (`<id>.<version>`). Missing entries are
    /// ignored.
    async fn remove(&self, filename: &str);

    /// Get one entry, with download counts refreshed
    async fn entry(&self, id: &str, version: &str) -> Result<Entry>;

    /// One page of the feed
    async fn feed(&self, query: FeedQuery) -> Result<Page<Entry>>;

    /// Read an archive and count the download
    async fn package_file(&self, id: &str, version: &str) -> Result<FileContent>;

    /// Read a file relative to the archive root
    async fn static_file(&self, path: &str) -> Result<FileContent>;

    /// Resolve a presented API key
    fn access_level(&self, key: Option<&str>) -> AccessTier;

    /// Number of entries in the catalog
    fn package_count(&self) -> usize;
}
