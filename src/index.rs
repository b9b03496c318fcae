//! The in-memory package catalog.
//!
//! Entries are kept sorted by [`storage_order`] (their `filename`). That
//! order is only for storage and cursor stability: which version is the
//! latest is decided by [`version::compare`](crate::version::compare), and
//! feeds are displayed in [`display_order`]. The catalog holds no locks of
//! its own; the registry wraps it in one.

use std::cmp::Ordering;
use std::collections::HashMap;

use depot_core::Entry;

use crate::downloads::Counts;
use crate::error::{Error, Result};
use crate::version;

/// Storage and cursor order: lexicographic on `filename`.
pub fn storage_order(a: &Entry, b: &Entry) -> Ordering {
    a.filename.cmp(&b.filename)
}

/// Display order: most recently published first.
pub fn display_order(a: &Entry, b: &Entry) -> Ordering {
    b.published.cmp(&a.published)
}

/// `<lowercased id>.<version>`, the catalog key and archive file stem.
pub fn filename(id: &str, version: &str) -> String {
    format!("{}.{}", id.to_lowercase(), version)
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<Entry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, filename: &str) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.filename.as_str().cmp(filename))
    }

    /// Insert in storage order without touching latest flags. Used while
    /// scanning, where flags are computed once at the end.
    pub fn insert_unflagged(&mut self, entry: Entry) -> Result<()> {
        match self.position(&entry.filename) {
            Ok(_) => Err(Error::AlreadyExists {
                id: entry.id,
                version: entry.version,
            }),
            Err(index) => {
                self.entries.insert(index, entry);
                Ok(())
            }
        }
    }

    /// Insert in storage order and recompute latest flags for its id.
    pub fn insert(&mut self, entry: Entry) -> Result<()> {
        let id = entry.id.clone();
        self.insert_unflagged(entry)?;
        self.recalc_latest_for(&id);
        Ok(())
    }

    /// Remove by exact filename and recompute latest flags for its id.
    pub fn remove(&mut self, filename: &str) -> Option<Entry> {
        let index = self.position(filename).ok()?;
        let removed = self.entries.remove(index);
        self.recalc_latest_for(&removed.id);
        Some(removed)
    }

    /// Case-insensitive id, exact version.
    pub fn find(&self, id: &str, version: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.has_id(id) && e.version == version)
    }

    /// Look up one entry with its counts taken from `counts`. The aggregate
    /// `download_count` is summed over every version of its id.
    pub fn get(&self, id: &str, version: &str, counts: &Counts) -> Option<Entry> {
        let mut entry = self.find(id, version)?.clone();
        entry.version_download_count = stored_count(counts, &entry);
        entry.download_count = self
            .entries
            .iter()
            .filter(|e| e.has_id(id))
            .map(|e| stored_count(counts, e))
            .sum();
        Some(entry)
    }

    /// Record a version's count and refresh the aggregate for its id.
    /// Counts only grow, so a value below the one already held is a late
    /// arrival and is ignored.
    pub fn raise_version_download_count(&mut self, id: &str, version: &str, count: u64) {
        let mut total = 0;
        for entry in self.entries.iter_mut().filter(|e| e.has_id(id)) {
            if entry.version == version {
                entry.version_download_count = entry.version_download_count.max(count);
            }
            total += entry.version_download_count;
        }
        for entry in self.entries.iter_mut().filter(|e| e.has_id(id)) {
            entry.download_count = total;
        }
    }

    /// Refresh every entry's version and aggregate counts from a counter
    /// snapshot.
    pub fn apply_download_counts(&mut self, counts: &Counts) {
        let totals = download_totals(&self.entries, counts);
        for entry in &mut self.entries {
            refresh_counts(entry, counts, &totals);
        }
    }

    /// Recompute latest flags for every id.
    pub fn recalc_latest(&mut self) {
        let mut latest: HashMap<String, String> = HashMap::new();
        for entry in &self.entries {
            let id = entry.id.to_lowercase();
            match latest.get(&id) {
                Some(max) if version::compare(&entry.version, max) != Ordering::Greater => {}
                _ => {
                    latest.insert(id, entry.version.clone());
                }
            }
        }

        for entry in &mut self.entries {
            let is_latest = latest
                .get(&entry.id.to_lowercase())
                .is_some_and(|max| version::compare(&entry.version, max) == Ordering::Equal);
            mark_latest(entry, is_latest);
        }
    }

    /// Recompute latest flags for one id.
    pub fn recalc_latest_for(&mut self, id: &str) {
        let max = self
            .entries
            .iter()
            .filter(|e| e.has_id(id))
            .map(|e| e.version.clone())
            .max_by(|a, b| version::compare(a, b));
        let Some(max) = max else {
            return;
        };

        for entry in self.entries.iter_mut().filter(|e| e.has_id(id)) {
            let is_latest = version::compare(&entry.version, &max) == Ordering::Equal;
            mark_latest(entry, is_latest);
        }
    }
}

fn stored_count(counts: &Counts, entry: &Entry) -> u64 {
    counts.get(&entry.key()).copied().unwrap_or(0)
}

/// Downloads per lowercased id, summed over the versions in `entries`.
pub fn download_totals(entries: &[Entry], counts: &Counts) -> HashMap<String, u64> {
    let mut totals: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        *totals.entry(entry.id.to_lowercase()).or_insert(0) += stored_count(counts, entry);
    }
    totals
}

/// Set an entry's version and aggregate counts from a snapshot and the
/// totals computed by [`download_totals`].
pub fn refresh_counts(entry: &mut Entry, counts: &Counts, totals: &HashMap<String, u64>) {
    entry.version_download_count = stored_count(counts, entry);
    entry.download_count = totals
        .get(&entry.id.to_lowercase())
        .copied()
        .unwrap_or(0);
}

fn mark_latest(entry: &mut Entry, is_latest: bool) {
    entry.is_latest_version = is_latest;
    entry.is_absolute_latest_version = is_latest;
}

#[cfg(test)]
pub(crate) mod tests {
    use jiff::Timestamp;

    use super::*;

    pub(crate) fn entry(id: &str, version: &str, published: i64) -> Entry {
        let at = Timestamp::from_second(published).unwrap();
        Entry {
            id: id.to_string(),
            version: version.to_string(),
            filename: filename(id, version),
            title: None,
            authors: None,
            owners: None,
            description: None,
            summary: None,
            release_notes: None,
            copyright: None,
            tags: None,
            project_url: None,
            icon_url: None,
            license_url: None,
            dependencies: Vec::new(),
            hash: String::new(),
            hash_algorithm: "SHA512".to_string(),
            size: 0,
            created: at,
            last_edited: at,
            published: at,
            updated: at,
            content_src: String::new(),
            is_latest_version: false,
            is_absolute_latest_version: false,
            version_download_count: 0,
            download_count: 0,
        }
    }

    fn is_sorted(catalog: &Catalog) -> bool {
        catalog
            .entries()
            .windows(2)
            .all(|w| storage_order(&w[0], &w[1]) == Ordering::Less)
    }

    fn latest_versions(catalog: &Catalog, id: &str) -> Vec<String> {
        catalog
            .entries()
            .iter()
            .filter(|e| e.has_id(id) && e.is_latest_version)
            .map(|e| e.version.clone())
            .collect()
    }

    #[test]
    fn test_stays_sorted_through_inserts_and_removes() {
        let mut catalog = Catalog::new();
        let versions = [
            ("b", "1.0"),
            ("a", "2.0"),
            ("c", "0.1"),
            ("a", "10.0"),
            ("a", "1.0"),
            ("B", "0.5"),
        ];
        for (i, (id, version)) in versions.iter().enumerate() {
            catalog.insert(entry(id, version, i as i64)).unwrap();
            assert!(is_sorted(&catalog));
        }

        assert!(catalog.remove("a.2.0").is_some());
        assert!(is_sorted(&catalog));
        assert!(catalog.remove("nothing.1.0").is_none());
        assert_eq!(catalog.len(), 5);

        catalog.insert(entry("aa", "1.0", 9)).unwrap();
        assert!(is_sorted(&catalog));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("Demo", "1.0", 1)).unwrap();
        let err = catalog.insert(entry("demo", "1.0", 2)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_latest_uses_numeric_order() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("demo", "1.9.0", 1)).unwrap();
        catalog.insert(entry("demo", "1.10.0", 2)).unwrap();
        catalog.insert(entry("demo", "1.2", 3)).unwrap();
        catalog.insert(entry("other", "0.1", 4)).unwrap();

        assert_eq!(latest_versions(&catalog, "demo"), vec!["1.10.0"]);
        assert_eq!(latest_versions(&catalog, "other"), vec!["0.1"]);
        assert!(catalog
            .entries()
            .iter()
            .all(|e| e.is_latest_version == e.is_absolute_latest_version));

        catalog.remove("demo.1.10.0");
        assert_eq!(latest_versions(&catalog, "demo"), vec!["1.9.0"]);
    }

    #[test]
    fn test_numeric_ties_are_all_latest() {
        let mut catalog = Catalog::new();
        catalog.insert_unflagged(entry("demo", "1.2", 1)).unwrap();
        catalog.insert_unflagged(entry("demo", "1.2.0", 2)).unwrap();
        catalog.insert_unflagged(entry("demo", "1.1", 3)).unwrap();
        catalog.recalc_latest();

        assert_eq!(latest_versions(&catalog, "demo"), vec!["1.2", "1.2.0"]);
    }

    #[test]
    fn test_latest_is_case_insensitive_on_id() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("Demo", "1.0", 1)).unwrap();
        catalog.insert(entry("demo", "2.0", 2)).unwrap();
        assert_eq!(latest_versions(&catalog, "DEMO"), vec!["2.0"]);
    }

    #[test]
    fn test_get_sums_downloads_across_versions() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("Demo", "1.0", 1)).unwrap();
        catalog.insert(entry("Demo", "2.0", 2)).unwrap();
        let counts: Counts = [("demo/1.0".to_string(), 3), ("demo/2.0".to_string(), 4)]
            .into_iter()
            .collect();

        let found = catalog.get("dEmO", "2.0", &counts).unwrap();
        assert_eq!(found.version_download_count, 4);
        assert_eq!(found.download_count, 7);
        assert!(catalog.get("demo", "3.0", &counts).is_none());

        // the catalog itself is left untouched
        assert_eq!(catalog.find("demo", "2.0").unwrap().version_download_count, 0);
    }

    #[test]
    fn test_raise_ignores_late_lower_counts() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("Demo", "1.0", 1)).unwrap();
        catalog.insert(entry("Demo", "2.0", 2)).unwrap();

        catalog.raise_version_download_count("demo", "1.0", 5);
        catalog.raise_version_download_count("demo", "1.0", 4);
        catalog.raise_version_download_count("DEMO", "2.0", 1);

        let found = catalog.find("demo", "1.0").unwrap();
        assert_eq!(found.version_download_count, 5);
        assert_eq!(found.download_count, 6);
    }

    #[test]
    fn test_non_ascii_ids_fold_case() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("Äpkg", "1.0", 1)).unwrap();
        catalog.insert(entry("äpkg", "2.0", 2)).unwrap();

        assert_eq!(latest_versions(&catalog, "ÄPKG"), vec!["2.0"]);
        assert!(catalog.find("äpkg", "1.0").is_some());

        let counts: Counts = [("äpkg/1.0".to_string(), 2), ("äpkg/2.0".to_string(), 3)]
            .into_iter()
            .collect();
        let found = catalog.get("äpkg", "1.0", &counts).unwrap();
        assert_eq!(found.id, "Äpkg");
        assert_eq!(found.download_count, 5);

        let err = catalog.insert(entry("ÄPKG", "1.0", 3)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn test_apply_download_counts() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("Demo", "1.0", 1)).unwrap();
        catalog.insert(entry("Demo", "2.0", 2)).unwrap();
        catalog.insert(entry("Other", "1.0", 3)).unwrap();

        let counts: Counts = [
            ("demo/1.0".to_string(), 5),
            ("demo/2.0".to_string(), 1),
            ("gone/1.0".to_string(), 9),
        ]
        .into_iter()
        .collect();
        catalog.apply_download_counts(&counts);

        let demo = catalog.find("demo", "1.0").unwrap();
        assert_eq!(demo.version_download_count, 5);
        assert_eq!(demo.download_count, 6);
        let other = catalog.find("other", "1.0").unwrap();
        assert_eq!(other.version_download_count, 0);
        assert_eq!(other.download_count, 0);
    }
}
