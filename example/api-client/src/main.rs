//! HTTP client example for depot
//!
//! Walks the package feed, looks at one entry and downloads its archive.
//!
//! Usage:
//!   cargo run -p api-client [--url http://localhost:8080] [--key API_KEY]

use depot_core::{Entry, Page};

const DEFAULT_URL: &str = "http://localhost:8080";
const API_KEY_HEADER: &str = "X-NuGet-ApiKey";

fn flag(name: &str) -> Option<String> {
    std::env::args().skip_while(|arg| arg != name).nth(1)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::args()
        .nth(1)
        .filter(|arg| !arg.starts_with('-'))
        .or_else(|| flag("--url"))
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    let api_key = flag("--key");

    println!("Depot API Client Demo");
    println!("=====================\n");
    println!("Connecting to: {}\n", base_url);

    let client = reqwest::Client::new();
    let get = |url: String| {
        let request = client.get(url);
        match &api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    };

    // 1. Walk the whole feed, newest first
    println!("1. Listing packages...\n");
    let mut entries: Vec<Entry> = Vec::new();
    let mut url = format!("{}/api/v2/Packages?$top=50", base_url);
    loop {
        let page: Page<Entry> = get(url).send().await?.error_for_status()?.json().await?;
        for entry in &page.items {
            let latest = if entry.is_latest_version { " (latest)" } else { "" };
            println!("   - {} {}{}", entry.id, entry.version, latest);
            println!("     Published: {}, downloads: {}", entry.published, entry.version_download_count);
        }
        entries.extend(page.items);

        match page.next {
            Some(next) if page.has_more => url = next,
            _ => break,
        }
    }
    println!("\n   {} package(s) in total\n", entries.len());

    let Some(first) = entries.first() else {
        println!("No packages found in feed.");
        return Ok(());
    };

    // 2. Get one entry
    println!("2. Getting entry for '{} {}'...\n", first.id, first.version);
    let entry: Entry = get(format!(
        "{}/api/v2/package/{}/{}",
        base_url, first.id, first.version
    ))
    .send()
    .await?
    .error_for_status()?
    .json()
    .await?;

    if let Some(description) = &entry.description {
        println!("   Description: {}", description);
    }
    if let Some(authors) = &entry.authors {
        println!("   Authors: {}", authors);
    }
    println!("   Size: {} bytes", entry.size);
    println!("   {}: {}", entry.hash_algorithm, entry.hash);
    for dependency in &entry.dependencies {
        println!(
            "   Depends on: {} {}",
            dependency.id,
            dependency.version.as_deref().unwrap_or("*")
        );
    }
    println!();

    // 3. Download the archive
    println!("3. Downloading '{}'...\n", entry.content_src);
    let response = get(entry.content_src.clone()).send().await?.error_for_status()?;

    let content_disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let bytes = response.bytes().await?;
    println!("   Downloaded {} bytes", bytes.len());
    println!("   Content-Disposition: {}", content_disposition);

    println!("\nDemo complete!");

    Ok(())
}
