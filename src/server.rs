//! Caching reverse proxy that hosts the controller over HTTP.
//!
//! Every request that is not under `/__offline/` is mapped onto the scope
//! URL and handed to the [`ServiceWorkerHost`], so a browser pointed at the
//! proxy sees the same cache behavior an installed service worker gives.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::http::header::CONTENT_LENGTH;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::get;
use reqwest::Url;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::{Request, RequestMode};
use crate::lifecycle::ServiceWorkerHost;
use crate::network::Network;
use crate::stats::StatsSnapshot;
use crate::storage::CacheStorage;

/// Largest request body the proxy will buffer.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Response header naming where a proxied response came from.
pub const SOURCE_HEADER: &str = "x-offline-cache";

struct AppState<S: CacheStorage, N: Network> {
    host: Arc<ServiceWorkerHost<S, N>>,
    scope: Url,
}

impl<S: CacheStorage, N: Network> Clone for AppState<S, N> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            scope: self.scope.clone(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    state: String,
    cache: String,
}

async fn api_health<S, N>(State(state): State<AppState<S, N>>) -> impl IntoResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        state: state.host.state().to_string(),
        cache: state.host.controller().cache_name().to_string(),
    })
}

async fn api_stats<S, N>(State(state): State<AppState<S, N>>) -> axum::Json<StatsSnapshot>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    axum::Json(state.host.controller().stats().snapshot())
}

/// Maps a proxy path onto the scope, keeping the query string.
///
/// The path is always joined as a relative reference, and the result must
/// share the scope's origin and sit under its path.
fn upstream_url(scope: &Url, path_and_query: &str) -> Result<Url> {
    let relative = format!("./{}", path_and_query.trim_start_matches('/'));
    let url = scope
        .join(&relative)
        .map_err(|e| Error::Network(format!("cannot map {path_and_query} onto {scope}: {e}")))?;
    if url.origin() != scope.origin() || !url.path().starts_with(scope.path()) {
        return Err(Error::Network(format!("{path_and_query} is outside {scope}")));
    }
    Ok(url)
}

async fn proxy<S, N>(State(state): State<AppState<S, N>>, req: axum::extract::Request) -> AxumResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", axum::http::uri::PathAndQuery::as_str);

    let url = match upstream_url(&state.scope, path_and_query) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let Ok(body) = axum::body::to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
    };

    let mode = parts
        .headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_fetch_mode)
        .unwrap_or_default();

    let request = Request {
        method: parts.method,
        url,
        mode,
        headers: parts.headers,
        body,
    };

    match state.host.handle(&request).await {
        Ok(served) => {
            let mut headers = served.response.headers;
            headers.remove(CONTENT_LENGTH);
            headers.insert(SOURCE_HEADER, HeaderValue::from_static(served.source.as_str()));
            (served.response.status, headers, Body::from(served.response.body)).into_response()
        }
        Err(e) => {
            log::warn!("{} {} failed: {e}", request.method, request.url);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Builds the proxy router for `host`.
///
/// # Errors
///
/// Returns a configuration error if the controller's scope is invalid.
pub fn router<S, N>(host: Arc<ServiceWorkerHost<S, N>>) -> Result<Router>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let scope = host.controller().config().scope_url()?;
    let state = AppState { host, scope };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/__offline/health", get(api_health::<S, N>))
        .route("/__offline/stats", get(api_stats::<S, N>))
        .fallback(proxy::<S, N>)
        .layer(cors)
        .with_state(state))
}

/// Serves `host` on an already bound listener until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the server fails.
pub async fn serve<S, N>(
    listener: TcpListener,
    host: Arc<ServiceWorkerHost<S, N>>,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let app = router(host)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Binds to the configured address and serves `host`.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server<S, N>(
    host: Arc<ServiceWorkerHost<S, N>>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;
    log::info!(
        "Serving {} on http://{addr}",
        host.controller().config().scope
    );
    serve(listener, host, shutdown).await
}
