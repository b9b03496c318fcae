use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::access::{AccessPolicy, AccessTier};
use crate::archive::{self, Archive};
use crate::config::{Config, HashAlgorithm, RegistryConfig};
use crate::downloads::{self, Counts, DownloadCounts};
use crate::error::{Error, Result};
use crate::feed;
use crate::index::{self, Catalog};
use crate::manifest::{is_path_segment, Manifest};
use crate::registry::{Entry, FeedQuery, FileContent, Page, Registry};

const CONTENT_DIR: &str = "content";
const ARCHIVE_CONTENT_TYPE: &str = "application/octet-stream";

/// Filesystem-backed registry with an in-memory catalog
///
/// Directory structure:
/// ```text
/// {root}/downloads.json
/// {root}/{lowercased id}/{version}/{lowercased id}.{version}.nupkg
/// {root}/{lowercased id}/{version}/content/{path}
/// ```
///
/// The archives on disk are the source of truth; the catalog is rebuilt
/// from them by [`FilesystemRegistry::init`].
pub struct FilesystemRegistry {
    root: PathBuf,
    base_url: String,
    hash_algorithm: HashAlgorithm,
    access: AccessPolicy,
    catalog: RwLock<Catalog>,
    downloads: DownloadCounts,
}

impl FilesystemRegistry {
    /// An empty registry rooted at `root`. Call [`init`](Self::init)
    /// before use.
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        let root = root.into();
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            downloads: DownloadCounts::empty(root.join(downloads::FILE_NAME)),
            root,
            base_url,
            hash_algorithm: HashAlgorithm::default(),
            access: AccessPolicy::default(),
            catalog: RwLock::new(Catalog::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let RegistryConfig::Filesystem { path } = &config.registry;
        Self::new(path.clone(), &config.base_url)
            .with_hash_algorithm(config.hash_algorithm)
            .with_access_policy(AccessPolicy::new(config.api_keys.clone()))
    }

    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    pub fn with_access_policy(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy of the catalog in storage order
    pub fn entries(&self) -> Vec<Entry> {
        self.catalog.read().entries().to_vec()
    }

    /// Create the root if needed, load download counts and rebuild the
    /// catalog from every archive under the root.
    pub async fn init(&self) -> Result<()> {
        if !fs::try_exists(&self.root).await? {
            info!("Creating registry directory: {}", self.root.display());
            fs::create_dir_all(&self.root).await?;
        }

        if let Err(e) = self.downloads.reload().await {
            warn!(
                "Could not load download counts from {}: {}",
                self.downloads.path().display(),
                e
            );
        }

        let mut catalog = self.scan().await?;
        catalog.apply_download_counts(&self.downloads.snapshot().await);
        catalog.recalc_latest();

        let count = catalog.len();
        *self.catalog.write() = catalog;
        info!("Loaded {} packages from {}", count, self.root.display());
        Ok(())
    }

    async fn scan(&self) -> Result<Catalog> {
        let mut catalog = Catalog::new();

        for (id, id_dir) in subdirectories(&self.root).await? {
            // packages are always stored under their lowercased id
            if id != id.to_lowercase() {
                warn!("Skipping {}: id directory is not lowercase", id_dir.display());
                continue;
            }
            let versions = match subdirectories(&id_dir).await {
                Ok(versions) => versions,
                Err(e) => {
                    warn!("Skipping {}: {}", id_dir.display(), e);
                    continue;
                }
            };

            for (version, version_dir) in versions {
                let stem = index::filename(&id, &version);
                let path = version_dir.join(format!("{}.{}", stem, archive::EXTENSION));
                if !fs::try_exists(&path).await.unwrap_or(false) {
                    warn!("Skipping {}: no archive found", version_dir.display());
                    continue;
                }

                let entry = match self.ingest(&path, &stem).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                if let Err(e) = catalog.insert_unflagged(entry) {
                    warn!("Skipping {}: {}", path.display(), e);
                }
            }
        }

        Ok(catalog)
    }

    fn package_dir(&self, id: &str, version: &str) -> PathBuf {
        self.root.join(id.to_lowercase()).join(version)
    }

    fn archive_path(&self, id: &str, version: &str) -> PathBuf {
        self.package_dir(id, version).join(format!(
            "{}.{}",
            index::filename(id, version),
            archive::EXTENSION
        ))
    }

    /// Read an archive found by the scan, extract its content files and
    /// build its entry. The manifest must match the directory it was found
    /// in (`expected` is the `<id>.<version>` stem).
    async fn ingest(&self, path: &Path, expected: &str) -> Result<Entry> {
        let data = fs::read(path).await?;
        let modified = fs::metadata(path).await?.modified()?;
        let archive = archive::read(&data)?;

        let manifest = &archive.manifest;
        if index::filename(&manifest.id, &manifest.version) != expected {
            return Err(Error::InvalidManifest(format!(
                "declares {} {} but is stored as {}",
                manifest.id, manifest.version, expected
            )));
        }

        self.extract_content(&archive).await?;
        self.build_entry(&archive.manifest, &data, modified)
    }

    async fn extract_content(&self, archive: &Archive) -> Result<()> {
        let manifest = &archive.manifest;
        let content_dir = self
            .package_dir(&manifest.id, &manifest.version)
            .join(CONTENT_DIR);

        for (relative, data) in archive.content_files() {
            let target = content_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, data).await?;
        }
        Ok(())
    }

    fn build_entry(&self, manifest: &Manifest, data: &[u8], modified: SystemTime) -> Result<Entry> {
        let at = Timestamp::try_from(modified).map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Entry {
            id: manifest.id.clone(),
            version: manifest.version.clone(),
            filename: index::filename(&manifest.id, &manifest.version),
            title: manifest.title.clone(),
            authors: manifest.authors.clone(),
            owners: manifest.owners.clone(),
            description: manifest.description.clone(),
            summary: manifest.summary.clone(),
            release_notes: manifest.release_notes.clone(),
            copyright: manifest.copyright.clone(),
            tags: manifest.tags.clone(),
            project_url: manifest.project_url.clone(),
            icon_url: manifest.icon_url.clone(),
            license_url: manifest.license_url.clone(),
            dependencies: manifest.dependencies.clone(),
            hash: self.hash_algorithm.digest(data),
            hash_algorithm: self.hash_algorithm.label().to_string(),
            size: data.len() as u64,
            created: at,
            last_edited: at,
            published: at,
            updated: at,
            content_src: format!(
                "{}nupkg/{}/{}",
                self.base_url, manifest.id, manifest.version
            ),
            is_latest_version: false,
            is_absolute_latest_version: false,
            version_download_count: 0,
            download_count: 0,
        })
    }

    /// Write the archive, extract it and add it to the catalog.
    async fn write_package(
        &self,
        file: &mut fs::File,
        path: &Path,
        archive: &Archive,
        package: &[u8],
    ) -> Result<Entry> {
        file.write_all(package).await?;
        file.sync_all().await?;

        self.extract_content(archive).await?;
        let modified = fs::metadata(path).await?.modified()?;
        let entry = self.build_entry(&archive.manifest, package, modified)?;

        let count = self.downloads.get(&entry.id, &entry.version).await;
        self.insert_entry(entry, count)
    }

    fn insert_entry(&self, entry: Entry, download_count: u64) -> Result<Entry> {
        let (id, version) = (entry.id.clone(), entry.version.clone());
        let mut catalog = self.catalog.write();
        catalog.insert(entry)?;
        catalog.raise_version_download_count(&id, &version, download_count);
        catalog
            .find(&id, &version)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("{id} {version} missing after insert")))
    }

    fn refreshed_entry(&self, counts: &Counts, id: &str, version: &str) -> Result<Entry> {
        self.catalog
            .read()
            .get(id, version, counts)
            .ok_or_else(|| Error::NotFound(format!("{id} {version}")))
    }

    fn refreshed_page(&self, counts: &Counts, query: &FeedQuery) -> Page<Entry> {
        let (mut page, totals) = {
            let catalog = self.catalog.read();
            let totals = index::download_totals(catalog.entries(), counts);
            (feed::query(catalog.entries(), query), totals)
        };
        for entry in &mut page.items {
            index::refresh_counts(entry, counts, &totals);
        }
        page
    }
}

#[async_trait]
impl Registry for FilesystemRegistry {
    async fn store(&self, package: Bytes) -> Result<Entry> {
        let archive = archive::read(&package)?;
        let id = archive.manifest.id.clone();
        let version = archive.manifest.version.clone();
        let conflict = || Error::AlreadyExists {
            id: id.clone(),
            version: version.clone(),
        };

        let dir = self.package_dir(&id, &version);
        let path = self.archive_path(&id, &version);
        if fs::try_exists(&path).await? {
            return Err(conflict());
        }
        fs::create_dir_all(&dir).await?;

        // exclusive create: of two concurrent uploads only one gets here
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(conflict()),
            Err(e) => return Err(e.into()),
        };

        let written = self.write_package(&mut file, &path, &archive, &package).await;
        match written {
            Ok(entry) => {
                info!("Stored package: {} {}", entry.id, entry.version);
                Ok(entry)
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                    warn!("Failed to clean up {}: {}", dir.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn remove(&self, filename: &str) {
        let removed = self.catalog.write().remove(filename);
        let Some(entry) = removed else {
            debug!("Nothing to remove for {}", filename);
            return;
        };

        let dir = self.package_dir(&entry.id, &entry.version);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!("Failed to delete {}: {}", dir.display(), e);
        }
        info!("Removed package: {} {}", entry.id, entry.version);
    }

    async fn entry(&self, id: &str, version: &str) -> Result<Entry> {
        let counts = self.downloads.snapshot().await;
        self.refreshed_entry(&counts, id, version)
    }

    async fn feed(&self, query: FeedQuery) -> Result<Page<Entry>> {
        let counts = self.downloads.snapshot().await;
        Ok(self.refreshed_page(&counts, &query))
    }

    async fn package_file(&self, id: &str, version: &str) -> Result<FileContent> {
        let not_found = || Error::NotFound(format!("{id} {version}"));
        if !is_path_segment(id) || !is_path_segment(version) {
            return Err(not_found());
        }

        let path = self.archive_path(id, version);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let count = self.downloads.increment(id, version).await;
        self.catalog
            .write()
            .raise_version_download_count(id, version, count);

        debug!("Served package: {} {} ({} bytes)", id, version, data.len());
        Ok(FileContent {
            data: Bytes::from(data),
            content_type: ARCHIVE_CONTENT_TYPE,
        })
    }

    async fn static_file(&self, path: &str) -> Result<FileContent> {
        let relative = Path::new(path.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return Err(Error::NotFound(path.to_string()));
        }

        let full = self.root.join(relative);
        let data = fs::read(&full)
            .await
            .map_err(|_| Error::NotFound(path.to_string()))?;

        Ok(FileContent {
            data: Bytes::from(data),
            content_type: content_type(&full),
        })
    }

    fn access_level(&self, key: Option<&str>) -> AccessTier {
        self.access.resolve(key)
    }

    fn package_count(&self) -> usize {
        self.catalog.read().len()
    }
}

/// Sorted `(name, path)` pairs of the directories directly under `dir`
async fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            found.push((name.to_string(), entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

/// Content type by file extension
fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("xml" | "nuspec") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
