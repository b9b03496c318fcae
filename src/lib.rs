//! Package feed server for versioned `.nupkg` archives.
//!
//! Archives are stored under a root directory, indexed in memory and served
//! as a paged feed newest first, with per-version download counts.
//!
//! # Example
//!
//! ```ignore
//! use depot::{FeedQuery, FilesystemRegistry, Registry};
//!
//! let registry = FilesystemRegistry::new("./packages", "http://localhost:8080/api/v2/");
//! registry.init().await?;
//!
//! let entry = registry.store(archive_bytes).await?;
//! let page = registry.feed(FeedQuery::default()).await?;
//! ```

pub mod access;
pub mod api;
pub mod archive;
pub mod config;
pub mod downloads;
pub mod error;
pub mod feed;
pub mod index;
pub mod manifest;
pub mod registry;
pub mod version;

pub use access::{AccessPolicy, AccessTier, ApiKeys};
pub use depot_core::{Dependency, Entry, FeedQuery, Page};
pub use error::{Error, Result};
pub use registry::fs::FilesystemRegistry;
pub use registry::{FileContent, Registry};
