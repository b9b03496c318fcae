//! Core types for the depot package feed.
//!
//! This crate provides the shared data types used by both the depot
//! server and clients that page through its feed.
//!
//! # Overview
//!
//! The main types are:
//!
//! - [`Entry`] - One published archive version with its feed metadata
//! - [`Dependency`] - A dependency declared by an archive's manifest
//! - [`Page`] - A cursor-paginated feed response
//! - [`FeedQuery`] - Filter and cursor for a feed request
//!
//! # Example
//!
//! Walking every page of the feed:
//!
//! ```ignore
//! use depot_core::{Entry, Page};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = reqwest::Client::new();
//! let mut url = Some("http://localhost:8080/api/v2/Packages".to_string());
//!
//! while let Some(next) = url {
//!     let page: Page<Entry> = client.get(&next).send().await?.json().await?;
//!     for entry in &page.items {
//!         println!("{} {}", entry.id, entry.version);
//!     }
//!     url = page.next;
//! }
//! # Ok(())
//! # }
//! ```

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Key identifying one version of a package.
///
/// The id is lowercased so keys compare case-insensitively on id and
/// exactly on version. Used for download counters and feed cursors.
///
/// ```
/// assert_eq!(depot_core::package_key("Newtonsoft.Json", "13.0.1"), "newtonsoft.json/13.0.1");
/// ```
pub fn package_key(id: &str, version: &str) -> String {
    format!("{}/{}", id.to_lowercase(), version)
}

/// One published archive version.
///
/// Serialized with the camel-cased property names feed clients expect
/// (`isLatestVersion`, `downloadCount`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Package id with its original casing.
    pub id: String,
    /// Dotted version string as declared by the manifest.
    pub version: String,
    /// `<lowercased id>.<version>`; the catalog's storage order.
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub owners: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
    /// Space separated tags, as written in the manifest.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Hex digest of the raw archive bytes.
    pub hash: String,
    /// Digest name, e.g. `SHA512`.
    pub hash_algorithm: String,
    /// Archive length in bytes.
    pub size: u64,
    pub created: Timestamp,
    pub last_edited: Timestamp,
    pub published: Timestamp,
    pub updated: Timestamp,
    /// Download URL for this exact id and version.
    pub content_src: String,
    pub is_latest_version: bool,
    pub is_absolute_latest_version: bool,
    /// Downloads of this version.
    pub version_download_count: u64,
    /// Downloads summed across every version of this id.
    pub download_count: u64,
}

impl Entry {
    /// Counter and cursor key for this entry, see [`package_key`].
    pub fn key(&self) -> String {
        package_key(&self.id, &self.version)
    }

    /// Case-insensitive id comparison, folding case the same way as
    /// [`package_key`] (so `Äpkg` matches `äpkg`).
    pub fn has_id(&self, id: &str) -> bool {
        self.id == id || self.id.to_lowercase() == id.to_lowercase()
    }
}

/// A dependency declared by a package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub id: String,
    /// Version range as written, if any.
    #[serde(default)]
    pub version: Option<String>,
    /// Framework of the dependency group this came from.
    #[serde(default)]
    pub target_framework: Option<String>,
}

/// A cursor-paginated feed response.
///
/// `next` is a ready-to-follow URL for the following page, present only
/// when `has_more` is set and the server knows how to address it.
///
/// # Example
///
/// ```
/// use depot_core::Page;
///
/// let page = Page::new(vec!["a", "b"], true)
///     .with_next("http://localhost:8080/api/v2/Packages?$skiptoken='b','1.0'");
///
/// assert!(page.has_more);
/// assert_eq!(page.items.len(), 2);
/// assert!(page.next.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Whether entries remain beyond this page.
    pub has_more: bool,
    /// URL of the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page without a next link.
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self {
            items,
            has_more,
            next: None,
        }
    }

    /// Attaches the next-page link.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// Filter and cursor for a feed request.
///
/// # Example
///
/// ```
/// use depot_core::FeedQuery;
///
/// let query = FeedQuery {
///     id: Some("Newtonsoft.Json".to_string()),
///     start_after: Some("newtonsoft.json/12.0.3".to_string()),
///     max_results: 50,
/// };
/// assert_eq!(FeedQuery::default().max_results, 100);
/// # let _ = query;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    /// Restrict to one package id (case-insensitive).
    #[serde(default)]
    pub id: Option<String>,
    /// `id/version` of the last entry of the previous page.
    #[serde(default)]
    pub start_after: Option<String>,
    /// Page size. Defaults to 100.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            id: None,
            start_after: None,
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    100
}
