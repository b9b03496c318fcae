//! Static API-key access policy.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Permission tier granted to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    Denied,
    ReadOnly,
    ReadWrite,
}

impl AccessTier {
    pub fn require_read(self) -> Result<()> {
        if self >= AccessTier::ReadOnly {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    pub fn require_write(self) -> Result<()> {
        if self == AccessTier::ReadWrite {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}

/// Configured API keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub read_only: Vec<String>,
    #[serde(default)]
    pub read_write: Vec<String>,
}

/// Resolves a presented key to an [`AccessTier`].
///
/// - no keys configured: everyone gets read-write
/// - any read-only key configured: a key is required for everything
/// - only read-write keys configured: reads are open, writes need a key
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    keys: ApiKeys,
}

impl AccessPolicy {
    pub fn new(keys: ApiKeys) -> Self {
        let keep = |list: Vec<String>| list.into_iter().filter(|k| !k.is_empty()).collect();
        Self {
            keys: ApiKeys {
                read_only: keep(keys.read_only),
                read_write: keep(keys.read_write),
            },
        }
    }

    pub fn resolve(&self, presented: Option<&str>) -> AccessTier {
        let ApiKeys {
            read_only,
            read_write,
        } = &self.keys;

        if read_only.is_empty() && read_write.is_empty() {
            return AccessTier::ReadWrite;
        }

        let matches = |list: &[String]| presented.is_some_and(|key| list.iter().any(|k| k == key));

        if matches(read_write.as_slice()) {
            AccessTier::ReadWrite
        } else if read_only.is_empty() {
            AccessTier::ReadOnly
        } else if matches(read_only.as_slice()) {
            AccessTier::ReadOnly
        } else {
            AccessTier::Denied
        }
    }
}
