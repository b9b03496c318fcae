use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::index;
use crate::registry::{Entry, FeedQuery, Registry};

/// Build a response with a body and content type
pub fn respond(
    status: StatusCode,
    content_type: &str,
    body: Bytes,
) -> Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body))
        .map_err(|e| Error::Internal(e.to_string()))
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Full<Bytes>>> {
    let body = serde_json::to_vec(value)?;
    respond(status, "application/json", Bytes::from(body))
}

/// Handle GET /api/v2/Packages and /api/v2/FindPackagesById
pub async fn feed(
    registry: &dyn Registry,
    base_url: &str,
    endpoint: &str,
    query: FeedQuery,
) -> Result<Response<Full<Bytes>>> {
    let mut page = registry.feed(query.clone()).await?;
    if page.has_more {
        if let Some(last) = page.items.last() {
            let next = next_link(base_url, endpoint, &query, last);
            page = page.with_next(next);
        }
    }
    json(StatusCode::OK, &page)
}

/// Handle GET /api/v2/package/{id}/{version}
pub async fn entry(
    registry: &dyn Registry,
    id: &str,
    version: &str,
) -> Result<Response<Full<Bytes>>> {
    let entry = registry.entry(id, version).await?;
    json(StatusCode::OK, &entry)
}

/// Handle GET /api/v2/nupkg/{id}/{version}
pub async fn download(
    registry: &dyn Registry,
    id: &str,
    version: &str,
) -> Result<Response<Full<Bytes>>> {
    let file = registry.package_file(id, version).await?;
    let filename = format!("{}.{}", index::filename(id, version), crate::archive::EXTENSION);

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", file.content_type)
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        )
        .header("Cache-Control", "public, max-age=3600")
        .body(Full::new(file.data))
        .map_err(|e| Error::Internal(e.to_string()))
}

/// Handle GET /api/v2/files/{*path}
pub async fn static_file(registry: &dyn Registry, path: &str) -> Result<Response<Full<Bytes>>> {
    let file = registry.static_file(path).await?;
    respond(StatusCode::OK, file.content_type, file.data)
}

/// Handle PUT /api/v2/package
///
/// The request body is the raw archive. `multipart/form-data` uploads are
/// not decoded; see [`reject_multipart`].
pub async fn push(registry: &dyn Registry, body: Bytes) -> Result<Response<Full<Bytes>>> {
    if body.is_empty() {
        return Err(Error::BadRequest("empty package".into()));
    }
    let entry = registry.store(body).await?;
    json(StatusCode::CREATED, &entry)
}

/// Refuse multipart form uploads before the body is read.
pub fn reject_multipart(content_type: Option<&str>) -> Result<()> {
    let multipart = content_type.is_some_and(|ct| {
        ct.trim_start()
            .get(..10)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"))
    });
    if multipart {
        return Err(Error::BadRequest(
            "multipart uploads are not accepted, send the raw archive".into(),
        ));
    }
    Ok(())
}

/// Handle DELETE /api/v2/package/{id}/{version}
pub async fn delete(
    registry: &dyn Registry,
    id: &str,
    version: &str,
) -> Result<Response<Full<Bytes>>> {
    registry.remove(&index::filename(id, version)).await;
    respond(StatusCode::NO_CONTENT, "application/json", Bytes::new())
}

/// Percent-decode a path or query component. `+` is read as a space.
pub fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}

/// Parse a query string into decoded key/value pairs
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let Some(query) = query else {
        return HashMap::new();
    };

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Strip one pair of surrounding single quotes
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

/// The id named by `tolower(Id) eq 'x'`
fn filter_id(filter: &str) -> Option<String> {
    let mut parts = filter.trim().splitn(3, char::is_whitespace);
    let field = parts.next()?;
    let op = parts.next()?;
    let value = parts.next()?;

    let field_ok = field.eq_ignore_ascii_case("tolower(Id)") || field.eq_ignore_ascii_case("Id");
    if !field_ok || !op.eq_ignore_ascii_case("eq") {
        return None;
    }
    Some(unquote(value).to_string())
}

/// Cursor from `'Id','Version'` or `id/version`
fn skip_token(token: &str) -> String {
    match token.split_once(',') {
        Some((id, version)) => format!("{}/{}", unquote(id), unquote(version)),
        None => unquote(token).to_string(),
    }
}

/// Build the feed query from request parameters
pub fn feed_query(
    params: &HashMap<String, String>,
    id: Option<String>,
    page_size: usize,
) -> FeedQuery {
    let id = id
        .or_else(|| params.get("id").map(|v| unquote(v).to_string()))
        .or_else(|| params.get("$filter").and_then(|f| filter_id(f)))
        .filter(|id| !id.is_empty());

    let start_after = params
        .get("$skiptoken")
        .map(|t| skip_token(t))
        .filter(|t| !t.is_empty());

    let max_results = params
        .get("$top")
        .and_then(|t| t.trim().parse::<usize>().ok())
        .map_or(page_size, |top| top.clamp(1, page_size));

    FeedQuery {
        id,
        start_after,
        max_results,
    }
}

/// Link to the page after `last`
fn next_link(base_url: &str, endpoint: &str, query: &FeedQuery, last: &Entry) -> String {
    let mut params = Vec::new();
    if let Some(id) = &query.id {
        params.push(("id", format!("'{}'", id)));
    }
    params.push(("$top", query.max_results.to_string()));
    params.push(("$skiptoken", format!("'{}','{}'", last.id, last.version)));

    let encoded: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();
    format!("{}{}?{}", base_url, endpoint, encoded.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_decodes() {
        let params = parse_query(Some("id=%27Demo.Lib%27&$top=5&flag"));
        assert_eq!(params.get("id").map(String::as_str), Some("'Demo.Lib'"));
        assert_eq!(params.get("$top").map(String::as_str), Some("5"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_reject_multipart() {
        assert!(reject_multipart(Some("multipart/form-data; boundary=x")).is_err());
        assert!(reject_multipart(Some("Multipart/Form-Data")).is_err());
        assert!(reject_multipart(Some("application/octet-stream")).is_ok());
        assert!(reject_multipart(None).is_ok());
    }

    #[test]
    fn test_filter_id() {
        assert_eq!(filter_id("tolower(Id) eq 'demo.lib'").as_deref(), Some("demo.lib"));
        assert_eq!(filter_id("Id eq 'Demo'").as_deref(), Some("Demo"));
        assert_eq!(filter_id("IsLatestVersion"), None);
        assert_eq!(filter_id("tolower(Id) ne 'x'"), None);
    }

    #[test]
    fn test_skip_token_forms() {
        assert_eq!(skip_token("'Demo.Lib','1.2.0'"), "Demo.Lib/1.2.0");
        assert_eq!(skip_token("demo.lib/1.2.0"), "demo.lib/1.2.0");
    }

    #[test]
    fn test_feed_query_clamps_top() {
        let params = parse_query(Some("$top=500&$filter=tolower(Id)+eq+'demo'"));
        let query = feed_query(&params, None, 100);
        assert_eq!(query.max_results, 100);
        assert_eq!(query.id.as_deref(), Some("demo"));
        assert_eq!(query.start_after, None);

        let params = parse_query(Some("$top=10&$skiptoken='Demo','1.0'"));
        let query = feed_query(&params, None, 100);
        assert_eq!(query.max_results, 10);
        assert_eq!(query.start_after.as_deref(), Some("Demo/1.0"));
        assert_eq!(query.id, None);
    }

    #[test]
    fn test_next_link() {
        let query = FeedQuery {
            id: Some("demo".into()),
            start_after: None,
            max_results: 2,
        };
        let last = crate::index::tests::entry("Demo", "1.0.0", 0);
        let link = next_link("http://localhost/api/v2/", "FindPackagesById", &query, &last);
        assert_eq!(
            link,
            "http://localhost/api/v2/FindPackagesById?id=%27demo%27&$top=2&$skiptoken=%27Demo%27%2C%271.0.0%27"
        );

        let params = parse_query(link.split_once('?').map(|(_, q)| q));
        let parsed = feed_query(&params, None, 100);
        assert_eq!(parsed.start_after.as_deref(), Some("Demo/1.0.0"));
        assert_eq!(parsed.id.as_deref(), Some("demo"));
    }
}
