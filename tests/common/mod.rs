#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use bytes::Bytes;
use depot::FilesystemRegistry;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

pub const BASE_URL: &str = "http://localhost/api/v2/";

pub fn nuspec(id: &str, version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Test Author</authors>
    <description>Package {id}</description>
  </metadata>
</package>"#
    )
}

/// ZIP container with the given entries, uncompressed
pub fn zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let options = || FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, options()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A package archive with a manifest and one content file
pub fn package(id: &str, version: &str) -> Bytes {
    let manifest = nuspec(id, version);
    Bytes::from(zip(&[
        (&format!("{id}.nuspec"), manifest.as_bytes()),
        ("content/readme.txt", format!("{id} {version}").as_bytes()),
        ("lib/net8.0/lib.dll", b"\x4d\x5a\x90\x00"),
    ]))
}

pub async fn registry(root: &Path) -> FilesystemRegistry {
    let registry = FilesystemRegistry::new(root, BASE_URL);
    registry.init().await.unwrap();
    registry
}
