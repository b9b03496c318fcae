//! Archive reader.
//!
//! A package archive is a ZIP container with a `.nuspec` manifest at its
//! root. Reading is a pure function of the bytes and safe to call from any
//! number of tasks at once.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Component;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::manifest::{self, Manifest};

/// Archive file extension, without the dot.
pub const EXTENSION: &str = "nupkg";

const MANIFEST_EXTENSION: &str = ".nuspec";
const CONTENT_PREFIX: &str = "content/";

/// Contents of a package archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub manifest: Manifest,
    /// Every non-directory entry, keyed by its `/`-separated path.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    /// Payload files under `content/`, with every leading `content/`
    /// segment stripped.
    pub fn content_files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .filter_map(|(name, data)| content_path(name).map(|path| (path, data.as_slice())))
    }
}

/// Read an archive's manifest and payload.
///
/// Fails with [`Error::MalformedArchive`] when the bytes are not a ZIP
/// container and [`Error::ManifestMissing`] when no root-level manifest is
/// present. If more than one root-level manifest exists, the one with the
/// lexicographically smallest name is used.
pub fn read(bytes: &[u8]) -> Result<Archive> {
    let mut zip =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::MalformedArchive(e.to_string()))?;

    let mut files = BTreeMap::new();
    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| Error::MalformedArchive(e.to_string()))?;
        if file.is_dir() {
            continue;
        }

        let Some(name) = file.enclosed_name().and_then(|path| {
            let parts: Option<Vec<&str>> = path
                .components()
                .map(|c| match c {
                    Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect();
            parts.map(|p| p.join("/"))
        }) else {
            debug!("Skipping archive entry with unsafe path: {}", file.name());
            continue;
        };

        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| Error::MalformedArchive(e.to_string()))?;
        files.insert(name, data);
    }

    let manifest_data = files
        .iter()
        .find(|(name, _)| is_root_manifest(name))
        .map(|(_, data)| data)
        .ok_or(Error::ManifestMissing)?;
    let manifest = manifest::parse(manifest_data)?;

    Ok(Archive { manifest, files })
}

fn is_root_manifest(name: &str) -> bool {
    !name.contains('/') && name.to_ascii_lowercase().ends_with(MANIFEST_EXTENSION)
}

/// Strip repeated `content/` prefixes; `None` outside `content/`.
fn content_path(name: &str) -> Option<&str> {
    let mut rest = name.strip_prefix(CONTENT_PREFIX)?;
    while let Some(inner) = rest.strip_prefix(CONTENT_PREFIX) {
        rest = inner;
    }
    (!rest.is_empty()).then_some(rest)
}
