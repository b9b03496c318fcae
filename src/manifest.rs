//! Package manifest (`.nuspec`) parsing.

use depot_core::Dependency;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Metadata declared by a package archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub owners: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub tags: Option<String>,
    pub project_url: Option<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub dependencies: Vec<Dependency>,
}

#[derive(Deserialize)]
struct Document {
    metadata: Metadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(default)]
    id: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Option<String>,
    #[serde(default)]
    owners: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    release_notes: Option<String>,
    #[serde(default)]
    copyright: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    project_url: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    license_url: Option<String>,
    #[serde(default)]
    dependencies: Option<Dependencies>,
}

#[derive(Deserialize, Default)]
struct Dependencies {
    #[serde(default)]
    dependency: Vec<DependencyElement>,
    #[serde(default)]
    group: Vec<DependencyGroup>,
}

#[derive(Deserialize)]
struct DependencyGroup {
    #[serde(rename = "@targetFramework", default)]
    target_framework: Option<String>,
    #[serde(default)]
    dependency: Vec<DependencyElement>,
}

#[derive(Deserialize)]
struct DependencyElement {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@version", default)]
    version: Option<String>,
}

impl Dependencies {
    fn flatten(self) -> Vec<Dependency> {
        let ungrouped = self.dependency.into_iter().map(|d| Dependency {
            id: d.id,
            version: d.version,
            target_framework: None,
        });
        let grouped = self.group.into_iter().flat_map(|group| {
            let framework = group.target_framework;
            group.dependency.into_iter().map(move |d| Dependency {
                id: d.id,
                version: d.version,
                target_framework: framework.clone(),
            })
        });
        ungrouped.chain(grouped).collect()
    }
}

/// Parse a manifest document. `id` and `version` are required.
pub fn parse(xml: &[u8]) -> Result<Manifest> {
    let text = std::str::from_utf8(xml).map_err(|e| Error::InvalidManifest(e.to_string()))?;
    let text = text.trim_start_matches('\u{feff}');

    let document: Document =
        quick_xml::de::from_str(text).map_err(|e| Error::InvalidManifest(e.to_string()))?;
    let meta = document.metadata;

    let id = meta.id.trim().to_string();
    let version = meta.version.trim().to_string();
    if id.is_empty() {
        return Err(Error::InvalidManifest("missing id".into()));
    }
    if version.is_empty() {
        return Err(Error::InvalidManifest("missing version".into()));
    }
    if !is_path_segment(&id) || !is_path_segment(&version) {
        return Err(Error::InvalidManifest(format!(
            "unusable id or version: {id} {version}"
        )));
    }

    Ok(Manifest {
        id,
        version,
        title: meta.title,
        authors: meta.authors,
        owners: meta.owners,
        description: meta.description,
        summary: meta.summary,
        release_notes: meta.release_notes,
        copyright: meta.copyright,
        tags: meta.tags,
        project_url: meta.project_url,
        icon_url: meta.icon_url,
        license_url: meta.license_url,
        dependencies: meta.dependencies.map(Dependencies::flatten).unwrap_or_default(),
    })
}

/// Whether `s` can be used as a single directory name under the archive
/// root. Ids and versions both are.
pub(crate) fn is_path_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains(['/', '\\']) && !s.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUSPEC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>Demo.Lib</id>
    <version>1.2.0</version>
    <authors>Jane Doe</authors>
    <description>A demo library</description>
    <releaseNotes>First cut</releaseNotes>
    <tags>demo sample</tags>
    <projectUrl>https://example.com/demo</projectUrl>
    <dependencies>
      <group targetFramework="net8.0">
        <dependency id="Other.Lib" version="[1.0,)" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    #[test]
    fn test_parse_manifest_fields() {
        let manifest = parse(NUSPEC.as_bytes()).unwrap();
        assert_eq!(manifest.id, "Demo.Lib");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.authors.as_deref(), Some("Jane Doe"));
        assert_eq!(manifest.release_notes.as_deref(), Some("First cut"));
        assert_eq!(manifest.tags.as_deref(), Some("demo sample"));
        assert_eq!(manifest.project_url.as_deref(), Some("https://example.com/demo"));
        assert_eq!(
            manifest.dependencies,
            vec![Dependency {
                id: "Other.Lib".into(),
                version: Some("[1.0,)".into()),
                target_framework: Some("net8.0".into()),
            }]
        );
    }

    #[test]
    fn test_parse_requires_version() {
        let xml = "<package><metadata><id>Demo</id></metadata></package>";
        assert!(matches!(parse(xml.as_bytes()), Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn test_parse_rejects_path_like_id() {
        let xml = "<package><metadata><id>../evil</id><version>1.0</version></metadata></package>";
        assert!(matches!(parse(xml.as_bytes()), Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse(b"not xml at all").is_err());
    }
}
