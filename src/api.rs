use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use matchit::Router;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::Registry;

pub mod health;
pub mod packages;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-nuget-apikey";

/// Route identifier
#[derive(Clone, Copy)]
enum Route {
    Health,
    Push,
    Packages,
    FindPackagesById,
    Package,
    Download,
    Files,
}

/// Shared state for every connection
pub struct AppState {
    registry: Arc<dyn Registry>,
    router: Router<Route>,
    base_url: String,
    page_size: usize,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn Registry>,
        base_url: &str,
        page_size: usize,
    ) -> std::result::Result<Self, matchit::InsertError> {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            registry,
            router: build_router()?,
            base_url,
            page_size: page_size.max(1),
        })
    }
}

/// Build the router
fn build_router() -> std::result::Result<Router<Route>, matchit::InsertError> {
    let mut router = Router::new();
    router.insert("/health", Route::Health)?;
    router.insert("/api/v2/", Route::Push)?;
    router.insert("/api/v2/package", Route::Push)?;
    router.insert("/api/v2/Packages", Route::Packages)?;
    router.insert("/api/v2/Packages()", Route::Packages)?;
    router.insert("/api/v2/FindPackagesById", Route::FindPackagesById)?;
    router.insert("/api/v2/FindPackagesById()", Route::FindPackagesById)?;
    router.insert("/api/v2/package/{id}/{version}", Route::Package)?;
    router.insert("/api/v2/nupkg/{id}/{version}", Route::Download)?;
    router.insert("/api/v2/files/{*path}", Route::Files)?;
    Ok(router)
}

/// Handle incoming requests
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = dispatch(req, &state).await;

    let response = match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    info!("{} {} {}", response.status().as_u16(), method, path);
    Ok(response)
}

async fn dispatch<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = packages::parse_query(req.uri().query());

    debug!("{} {}", method, path);

    // Match route
    let matched = state
        .router
        .at(&path)
        .map_err(|_| Error::NotFound(path.clone()))?;
    let route = *matched.value;
    let param = |name: &str| {
        matched
            .params
            .get(name)
            .map(|v| packages::decode(v))
            .ok_or_else(|| Error::BadRequest(format!("missing {name}")))
    };

    if let Route::Health = route {
        return health::health(state.registry.as_ref()).await;
    }

    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let tier = state.registry.access_level(key);
    let registry = state.registry.as_ref();

    // Dispatch to handler
    match (method, route) {
        (Method::GET, Route::Packages) => {
            tier.require_read()?;
            let feed_query = packages::feed_query(&query, None, state.page_size);
            packages::feed(registry, &state.base_url, "Packages", feed_query).await
        }

        (Method::GET, Route::FindPackagesById) => {
            tier.require_read()?;
            let id = query
                .get("id")
                .map(|id| packages::unquote(id).to_string())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| Error::BadRequest("missing id".into()))?;
            let feed_query = packages::feed_query(&query, Some(id), state.page_size);
            packages::feed(registry, &state.base_url, "FindPackagesById", feed_query).await
        }

        (Method::GET, Route::Package) => {
            tier.require_read()?;
            packages::entry(registry, &param("id")?, &param("version")?).await
        }

        (Method::GET, Route::Download) => {
            tier.require_read()?;
            packages::download(registry, &param("id")?, &param("version")?).await
        }

        (Method::GET, Route::Files) => {
            tier.require_read()?;
            packages::static_file(registry, &param("path")?).await
        }

        (Method::PUT, Route::Push) => {
            tier.require_write()?;
            packages::reject_multipart(
                req.headers()
                    .get(hyper::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok()),
            )?;
            let body = req
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::BadRequest(format!("failed to read body: {e}")))?
                .to_bytes();
            packages::push(registry, body).await
        }

        (Method::DELETE, Route::Package) => {
            tier.require_write()?;
            packages::delete(registry, &param("id")?, &param("version")?).await
        }

        _ => packages::respond(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            Bytes::from(r#"{"error":"Method not allowed"}"#),
        ),
    }
}

/// Run the HTTP server
pub async fn run(config: Config, registry: Arc<dyn Registry>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let state = Arc::new(AppState::new(registry, &config.base_url, config.page_size)?);

    info!("Server listening on http://{}", addr);

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let state = Arc::clone(&state);
                handle_request(req, state)
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection from {}: {}", remote_addr, e);
            }
        });
    }
}
