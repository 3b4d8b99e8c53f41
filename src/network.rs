//! Network abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{CONNECTION, HOST, TRANSFER_ENCODING};

use crate::error::{Error, Result};
use crate::http::{Request, RequestMode, Response, ResponseType};

/// Abstraction over the network a controller falls back to.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request. Any error means the network is unavailable.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Builds a configured HTTP client for upstream requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Option<Duration>) -> reqwest::Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30));
    match timeout {
        Some(t) => builder.timeout(t).build(),
        None => builder.build(),
    }
}

/// Default network implementation using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Url,
}

impl HttpNetwork {
    /// Creates a network for requests scoped to `scope`.
    ///
    /// Responses from any other origin are typed as cross-origin.
    #[must_use]
    pub const fn new(client: reqwest::Client, scope: Url) -> Self {
        Self {
            client,
            origin: scope,
        }
    }

    /// Returns a reference to the underlying HTTP client.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn response_type(&self, request: &Request) -> ResponseType {
        if request.url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut headers = request.headers.clone();
        // Hop-by-hop and routing headers belong to the incoming connection.
        headers.remove(HOST);
        headers.remove(CONNECTION);
        headers.remove(TRANSFER_ENCODING);

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let kind = self.response_type(request);
        if kind == ResponseType::Opaque {
            return Ok(Response::opaque());
        }

        let status = response.status();
        let mut headers = response.headers().clone();
        headers.remove(TRANSFER_ENCODING);
        headers.remove(CONNECTION);
        let body = response.bytes().await?;
        log::debug!("{} {} -> {status}", request.method, request.url);

        Ok(Response {
            status,
            headers,
            body,
            kind,
        })
    }
}

/// Network that fails every request, for hosts running fully offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        Err(Error::Network(format!("offline: {} {}", request.method, request.url)))
    }
}
