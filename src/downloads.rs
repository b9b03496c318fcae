//! Download counter store.
//!
//! A flat JSON object of `"<id>/<version>"` to download count, persisted
//! at `<root>/downloads.json`. Every increment rewrites the whole table
//! before returning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use depot_core::package_key;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

/// File name of the counter table inside the archive root.
pub const FILE_NAME: &str = "downloads.json";

pub type Counts = BTreeMap<String, u64>;

/// Persistent download counters, safe for concurrent increment and
/// snapshot.
pub struct DownloadCounts {
    path: PathBuf,
    counts: Mutex<Counts>,
}

impl DownloadCounts {
    /// An empty table that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            counts: Mutex::new(Counts::new()),
        }
    }

    /// Load the table from `path`. A missing file yields an empty table;
    /// any other failure is returned.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let counts = Self::empty(path);
        counts.reload().await?;
        Ok(counts)
    }

    /// Replace the in-memory table with what is on disk. Keys written
    /// with the id's original casing are folded into their lowercased
    /// form, summing any that collide.
    pub async fn reload(&self) -> Result<()> {
        let loaded = match fs::read(&self.path).await {
            Ok(data) => fold_keys(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Counts::new(),
            Err(e) => return Err(e.into()),
        };
        *self.counts.lock().await = loaded;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count for one version.
    pub async fn get(&self, id: &str, version: &str) -> u64 {
        let counts = self.counts.lock().await;
        counts.get(&package_key(id, version)).copied().unwrap_or(0)
    }

    /// Add one download and write the table through to disk.
    ///
    /// Returns the new count. A failed write is logged and otherwise
    /// ignored; the in-memory count stays incremented and is persisted with
    /// the next successful write.
    pub async fn increment(&self, id: &str, version: &str) -> u64 {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(package_key(id, version)).or_insert(0);
        *count += 1;
        let count = *count;

        // written under the lock so saves land in increment order
        if let Err(e) = save(&self.path, &counts).await {
            warn!(
                "Failed to persist download counts to {}: {}",
                self.path.display(),
                e
            );
        }
        count
    }

    /// Copy of the current table.
    pub async fn snapshot(&self) -> Counts {
        self.counts.lock().await.clone()
    }

    /// Write the current table to disk.
    pub async fn save(&self) -> Result<()> {
        let counts = self.counts.lock().await;
        save(&self.path, &counts).await
    }
}

fn fold_keys(table: Counts) -> Counts {
    let mut folded = Counts::new();
    for (key, count) in table {
        let key = match key.rsplit_once('/') {
            Some((id, version)) => package_key(id, version),
            None => key,
        };
        let total = folded.entry(key).or_insert(0);
        *total = total.saturating_add(count);
    }
    folded
}

async fn save(path: &Path, counts: &Counts) -> Result<()> {
    let data = serde_json::to_vec_pretty(counts)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
