use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::api::packages::respond;
use crate::error::Result;
use crate::registry::Registry;

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    packages: usize,
}

/// Handle GET /health
pub async fn health(registry: &dyn Registry) -> Result<Response<Full<Bytes>>> {
    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        packages: registry.package_count(),
    };

    let body = serde_json::to_string(&response)?;
    respond(StatusCode::OK, "application/json", Bytes::from(body))
}
