//! Feed pages over the catalog.
//!
//! Entries are filtered by id, ordered newest-published first and cut into
//! pages resumed by an `id/version` cursor. A cursor that names no entry
//! (for example one that has since been removed) restarts at the first
//! page instead of failing.

use depot_core::{package_key, Entry, FeedQuery, Page};

use crate::index::display_order;

/// Build one feed page from `entries`.
///
/// Download counts are copied as they are on the entries; callers refresh
/// them on the returned page. A `max_results` of 0 is read as 1.
pub fn query(entries: &[Entry], query: &FeedQuery) -> Page<Entry> {
    let id = query.id.as_deref().filter(|id| !id.is_empty());
    let mut matched: Vec<&Entry> = entries
        .iter()
        .filter(|e| id.map_or(true, |id| e.has_id(id)))
        .collect();

    // stable, so equal publish times keep storage order
    matched.sort_by(|a, b| display_order(a, b));

    let start = query
        .start_after
        .as_deref()
        .filter(|token| !token.is_empty())
        .and_then(|token| cursor_position(&matched, token))
        .map_or(0, |i| i + 1);
    let end = start
        .saturating_add(query.max_results.max(1))
        .min(matched.len());
    let has_more = end < matched.len();

    let items = matched[start..end].iter().map(|e| (*e).clone()).collect();
    Page::new(items, has_more)
}

fn cursor_position(entries: &[&Entry], token: &str) -> Option<usize> {
    let (id, version) = token.split_once('/')?;
    let key = package_key(id, version);
    entries.iter().position(|e| e.key() == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::entry;

    fn page(entries: &[Entry], id: Option<&str>, start_after: Option<String>, max: usize) -> Page<Entry> {
        query(
            entries,
            &FeedQuery {
                id: id.map(String::from),
                start_after,
                max_results: max,
            },
        )
    }

    #[test]
    fn test_pagination_walks_all_entries() {
        let entries: Vec<Entry> = (0..250)
            .map(|i| entry("Demo", &format!("1.0.{i}"), 1_700_000_000 + i as i64))
            .collect();

        let mut cursor = None;
        let mut sizes = Vec::new();
        let mut more = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let p = page(&entries, Some("demo"), cursor.clone(), 100);
            sizes.push(p.items.len());
            more.push(p.has_more);
            for e in &p.items {
                assert!(seen.insert(e.key()));
            }
            let last = p.items.last().unwrap();
            cursor = Some(format!("{}/{}", last.id, last.version));
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(more, vec![true, true, false]);
        assert_eq!(seen.len(), 250);
    }

    #[test]
    fn test_newest_first() {
        let entries = vec![
            entry("a", "1.0", 100),
            entry("b", "1.0", 300),
            entry("c", "1.0", 200),
        ];
        let p = page(&entries, None, None, 10);
        let ids: Vec<_> = p.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(!p.has_more);
    }

    #[test]
    fn test_equal_publish_times_keep_storage_order() {
        let entries = vec![entry("a", "1.0", 5), entry("b", "1.0", 5), entry("c", "1.0", 5)];
        let p = page(&entries, None, None, 10);
        let ids: Vec<_> = p.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stale_cursor_restarts_at_first_page() {
        let entries = vec![entry("a", "1.0", 2), entry("a", "2.0", 1)];
        let p = page(&entries, None, Some("a/9.9".to_string()), 1);
        assert_eq!(p.items[0].version, "1.0");
        assert!(p.has_more);

        let p = page(&entries, None, Some("garbage".to_string()), 1);
        assert_eq!(p.items[0].version, "1.0");
    }

    #[test]
    fn test_cursor_id_is_case_insensitive() {
        let entries = vec![entry("Demo", "1.0", 2), entry("Demo", "2.0", 1)];
        let p = page(&entries, Some("DEMO"), Some("demo/1.0".to_string()), 10);
        assert_eq!(p.items.len(), 1);
        assert_eq!(p.items[0].version, "2.0");
    }

    #[test]
    fn test_id_filter() {
        let entries = vec![entry("a", "1.0", 1), entry("B", "1.0", 2), entry("b", "2.0", 3)];
        assert_eq!(page(&entries, Some("b"), None, 10).items.len(), 2);
        assert_eq!(page(&entries, Some(""), None, 10).items.len(), 3);
        assert!(page(&entries, Some("zzz"), None, 10).items.is_empty());
    }

    #[test]
    fn test_zero_page_size_still_advances() {
        let entries = vec![entry("a", "1.0", 2), entry("a", "2.0", 1)];
        let p = page(&entries, None, None, 0);
        assert_eq!(p.items.len(), 1);
        assert!(p.has_more);

        let p = page(&entries, None, Some("a/1.0".to_string()), 0);
        assert_eq!(p.items[0].version, "2.0");
        assert!(!p.has_more);
    }

    #[test]
    fn test_cursor_on_last_entry_gives_empty_page() {
        let entries = vec![entry("a", "1.0", 2), entry("a", "2.0", 1)];
        let p = page(&entries, None, Some("a/2.0".to_string()), 10);
        assert!(p.items.is_empty());
        assert!(!p.has_more);
    }
}
