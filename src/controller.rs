//! The offline cache controller: precache on install, prune on activate,
//! and pick a strategy per intercepted request.
//!
//! | request                   | strategy      | offline fallback                      |
//! |---------------------------|---------------|---------------------------------------|
//! | not GET                   | passthrough   | none (not intercepted)                |
//! | navigation / accepts HTML | network-first | cached match, then root document      |
//! | image GET                 | cache-first   | "Offline" SVG placeholder             |
//! | other GET                 | cache-first   | root document                         |
//!
//! Network-first only writes 2xx, non-opaque responses back to the store,
//! so a live error page is returned but never replaces the cached copy.
//!
//! When a fallback document is also missing the controller answers
//! `503 Offline` rather than failing the request.

use futures::{StreamExt, future, stream};
use reqwest::Url;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::format::{format_bytes, format_store_names};
use crate::http::{Request, RequestKey, Response, ResponseType};
use crate::network::Network;
use crate::stats::CacheStats;
use crate::storage::CacheStorage;
use crate::strategy::{RequestClass, accepts_image, offline_placeholder, offline_unavailable};

/// Where a response handed back by the controller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Live network response.
    Network,
    /// Exact match from the cache store.
    Cache,
    /// The cached root document standing in for the request.
    RootDocument,
    /// The synthesized "Offline" image.
    Placeholder,
    /// Synthesized `503` after every fallback was exhausted.
    Unavailable,
}

impl ResponseSource {
    /// Short lowercase label, used in logs and response headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::RootDocument => "root-document",
            Self::Placeholder => "placeholder",
            Self::Unavailable => "unavailable",
        }
    }
}

/// A response together with its origin.
#[derive(Debug, Clone)]
pub struct Served {
    /// The response to hand back.
    pub response: Response,
    /// Where it came from.
    pub source: ResponseSource,
}

impl Served {
    const fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Result of routing a request through the controller.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The controller does not handle this request.
    Passthrough,
    /// The controller produced a response.
    Respond(Served),
}

/// Summary of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Store the assets were written to.
    pub cache_name: String,
    /// Number of assets precached.
    pub assets: usize,
    /// Total body bytes precached.
    pub bytes: u64,
}

/// Request-interception layer over a single versioned cache store.
pub struct OfflineCacheController<S: CacheStorage, N: Network> {
    config: CacheConfig,
    cache_name: String,
    core_assets: Vec<Url>,
    root_document: RequestKey,
    storage: S,
    network: N,
    stats: CacheStats,
}

impl<S: CacheStorage, N: Network> OfflineCacheController<S, N> {
    /// Creates a controller after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the scope, assets or root document
    /// cannot be resolved.
    pub fn new(config: CacheConfig, storage: S, network: N) -> Result<Self> {
        config.validate()?;
        let core_assets = config.core_asset_urls()?;
        let root_document = RequestKey::get(&config.root_document_url()?);
        Ok(Self {
            cache_name: config.cache_name(),
            config,
            core_assets,
            root_document,
            storage,
            network,
            stats: CacheStats::new(),
        })
    }

    /// Returns the name of the store this controller owns.
    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Returns the controller configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cache storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the network.
    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    /// Returns the live counters.
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Precaches every core asset into the current store.
    ///
    /// All assets are fetched before anything is written. If any fetch fails
    /// or returns a non-2xx or opaque response, nothing is stored, a store
    /// created by this call is deleted again, and the failing URL is reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Install`] for a failed asset, or a storage error if
    /// the store cannot be opened.
    pub async fn on_install(&self) -> Result<InstallReport> {
        let created = self.storage.open(&self.cache_name).await?;
        log::info!(
            "Installing {}: precaching {} assets",
            self.cache_name,
            self.core_assets.len()
        );

        let fetched: Vec<(Request, Result<Response>)> = stream::iter(self.core_assets.iter().cloned())
            .map(|url| async move {
                let request = Request::get(url);
                let result = self.network.fetch(&request).await;
                (request, result)
            })
            .buffered(self.config.install_concurrency)
            .collect()
            .await;

        let mut items = Vec::with_capacity(fetched.len());
        for (request, result) in fetched {
            let reason = match result {
                Ok(response) if response.status.is_success() && response.kind != ResponseType::Opaque => {
                    items.push((request.key(), response));
                    continue;
                }
                Ok(response) if response.kind == ResponseType::Opaque => "opaque response".to_string(),
                Ok(response) => format!("status {}", response.status),
                Err(e) => e.to_string(),
            };
            return Err(self.abort_install(created, request.url.as_str(), reason).await);
        }

        if let Err(e) = self.storage.put_all(&self.cache_name, &items).await {
            return Err(self.abort_install(created, self.cache_name.as_str(), e.to_string()).await);
        }

        let bytes = items.iter().map(|(_, r)| r.body.len() as u64).sum();
        log::info!(
            "Installed {}: {} assets, {}",
            self.cache_name,
            items.len(),
            format_bytes(bytes)
        );
        Ok(InstallReport {
            cache_name: self.cache_name.clone(),
            assets: items.len(),
            bytes,
        })
    }

    async fn abort_install(&self, created: bool, url: &str, reason: String) -> Error {
        log::error!("Install of {} failed at {url}: {reason}", self.cache_name);
        if created {
            if let Err(e) = self.storage.delete(&self.cache_name).await {
                log::warn!("Could not remove partial store {}: {e}", self.cache_name);
            }
        }
        Error::Install {
            url: url.to_string(),
            reason,
        }
    }

    /// Deletes every store except the current one.
    ///
    /// Returns the names that were deleted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the stores cannot be listed or deleted.
    pub async fn on_activate(&self) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| *name != self.cache_name)
            .collect();

        let results = future::try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;
        let deleted: Vec<String> = stale
            .into_iter()
            .zip(results)
            .filter_map(|(name, removed)| removed.then_some(name))
            .collect();

        log::info!(
            "Activated {}; removed stale stores: {}",
            self.cache_name,
            format_store_names(&deleted)
        );
        Ok(deleted)
    }

    /// Decides how to satisfy an intercepted request.
    ///
    /// Never fails: network errors are answered from the cache or with a
    /// synthesized fallback.
    pub async fn on_fetch(&self, request: &Request) -> FetchOutcome {
        let served = match RequestClass::of(request) {
            RequestClass::Passthrough => {
                self.stats.record_passthrough();
                return FetchOutcome::Passthrough;
            }
            RequestClass::Navigation => self.network_first(request).await,
            RequestClass::Asset => self.cache_first(request).await,
        };
        log::debug!(
            "{} {} served from {}",
            request.method,
            request.url,
            served.source.as_str()
        );
        self.stats.record_served(served.response.body.len());
        FetchOutcome::Respond(served)
    }

    async fn network_first(&self, request: &Request) -> Served {
        self.stats.record_fetch();
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.status.is_success() && response.kind != ResponseType::Opaque {
                    self.store(&request.key(), &response).await;
                }
                Served::new(response, ResponseSource::Network)
            }
            Err(e) => {
                self.stats.record_network_failure();
                log::debug!("Network failed for {}: {e}", request.url);
                match self.lookup(&request.key()).await {
                    Some(cached) => {
                        self.stats.record_hit();
                        Served::new(cached, ResponseSource::Cache)
                    }
                    None => {
                        self.stats.record_miss();
                        self.root_fallback().await
                    }
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Served {
        let key = request.key();
        if let Some(cached) = self.lookup(&key).await {
            self.stats.record_hit();
            return Served::new(cached, ResponseSource::Cache);
        }
        self.stats.record_miss();

        self.stats.record_fetch();
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&key, &response).await;
                }
                Served::new(response, ResponseSource::Network)
            }
            Err(e) => {
                self.stats.record_network_failure();
                log::debug!("Network failed for {}: {e}", request.url);
                if accepts_image(request) {
                    self.stats.record_placeholder();
                    Served::new(offline_placeholder(), ResponseSource::Placeholder)
                } else {
                    self.root_fallback().await
                }
            }
        }
    }

    async fn root_fallback(&self) -> Served {
        if let Some(root) = self.lookup(&self.root_document).await {
            self.stats.record_root_fallback();
            return Served::new(root, ResponseSource::RootDocument);
        }
        self.stats.record_unavailable();
        Served::new(offline_unavailable(), ResponseSource::Unavailable)
    }

    /// Cache lookup where a storage failure counts as a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<Response> {
        match self.storage.match_request(&self.cache_name, key).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Cache read failed for {key}: {e}");
                None
            }
        }
    }

    /// Cache write where a storage failure is logged and ignored.
    async fn store(&self, key: &RequestKey, response: &Response) {
        match self.storage.put(&self.cache_name, key, response).await {
            Ok(()) => self.stats.record_write(),
            Err(e) => log::warn!("Cache write failed for {key}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::{MockNetwork, config, url};
    use async_trait::async_trait;
    use reqwest::StatusCode;

    type Controller = OfflineCacheController<MemoryStorage, MockNetwork>;

    fn controller(version: &str) -> Controller {
        OfflineCacheController::new(config(version), MemoryStorage::new(), MockNetwork::with_core_assets())
            .unwrap()
    }

    async fn installed(version: &str) -> Controller {
        let c = controller(version);
        c.on_install().await.unwrap();
        c
    }

    fn served(outcome: FetchOutcome) -> Served {
        match outcome {
            FetchOutcome::Respond(s) => s,
            FetchOutcome::Passthrough => panic!("expected a response"),
        }
    }

    fn image_request(path: &str) -> Request {
        Request::get(url(path)).with_accept("image/avif,image/webp,*/*").unwrap()
    }

    #[tokio::test]
    async fn install_precaches_every_core_asset() {
        let c = controller("v1");
        let report = c.on_install().await.unwrap();
        assert_eq!(report.cache_name, "offline-clicker-v1");
        assert_eq!(report.assets, 5);

        for asset in ["/", "/index.html", "/style.css", "/script.js", "/manifest.json"] {
            let hit = c
                .storage()
                .match_request("offline-clicker-v1", &RequestKey::get(&url(asset)))
                .await
                .unwrap();
            assert!(hit.is_some(), "{asset} missing after install");
        }
    }

    #[tokio::test]
    async fn install_fails_atomically_on_missing_asset() {
        let net = MockNetwork::with_core_assets();
        net.route_status("/script.js", StatusCode::NOT_FOUND);
        let c = OfflineCacheController::new(config("v1"), MemoryStorage::new(), net).unwrap();

        let err = c.on_install().await.unwrap_err();
        match err {
            Error::Install { url, reason } => {
                assert!(url.ends_with("/script.js"));
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!c.storage().has("offline-clicker-v1").await.unwrap());
    }

    #[tokio::test]
    async fn install_fails_when_offline() {
        let c = controller("v1");
        c.network().set_offline(true);
        assert!(matches!(c.on_install().await, Err(Error::Install { .. })));
        assert!(c.storage().keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_reinstall_keeps_existing_store() {
        let c = installed("v1").await;
        c.network().set_offline(true);
        assert!(c.on_install().await.is_err());
        assert!(c.storage().has("offline-clicker-v1").await.unwrap());
        assert_eq!(c.storage().entries("offline-clicker-v1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn activate_removes_other_stores() {
        let c = installed("v2").await;
        c.storage().open("offline-clicker-v1").await.unwrap();
        c.storage().open("unrelated").await.unwrap();

        let mut deleted = c.on_activate().await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["offline-clicker-v1", "unrelated"]);
        assert_eq!(c.storage().keys().await.unwrap(), vec!["offline-clicker-v2"]);
    }

    #[tokio::test]
    async fn activate_with_nothing_stale() {
        let c = installed("v1").await;
        assert!(c.on_activate().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_get_is_not_intercepted() {
        let c = installed("v1").await;
        let calls = c.network().calls();
        let post = Request::get(url("/api/save")).with_method(reqwest::Method::POST);
        assert!(matches!(c.on_fetch(&post).await, FetchOutcome::Passthrough));
        assert_eq!(c.network().calls(), calls);
        assert_eq!(c.stats().snapshot().passthroughs, 1);
    }

    #[tokio::test]
    async fn navigation_prefers_network_and_updates_cache() {
        let c = installed("v1").await;
        c.network()
            .route("/index.html", Response::ok("<html>fresh</html>").with_content_type("text/html"));

        let s = served(c.on_fetch(&Request::navigate(url("/index.html"))).await);
        assert_eq!(s.source, ResponseSource::Network);
        assert_eq!(s.response.text(), "<html>fresh</html>");

        let cached = c
            .storage()
            .match_request("offline-clicker-v1", &RequestKey::get(&url("/index.html")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.text(), "<html>fresh</html>");
    }

    #[tokio::test]
    async fn navigation_offline_uses_exact_match() {
        let c = installed("v1").await;
        c.network().set_offline(true);
        let s = served(c.on_fetch(&Request::navigate(url("/"))).await);
        assert_eq!(s.source, ResponseSource::Cache);
        assert_eq!(s.response.text(), "<html>root</html>");
    }

    #[tokio::test]
    async fn navigation_offline_falls_back_to_root_document() {
        let c = installed("v1").await;
        c.network().set_offline(true);
        let s = served(c.on_fetch(&Request::navigate(url("/levels/7"))).await);
        assert_eq!(s.source, ResponseSource::RootDocument);
        assert_eq!(s.response.text(), "<html>index</html>");
        assert_eq!(c.stats().snapshot().root_fallbacks, 1);
    }

    #[tokio::test]
    async fn navigation_error_status_is_returned_but_not_cached() {
        let c = installed("v1").await;
        c.network().route_status("/missing", StatusCode::NOT_FOUND);
        let s = served(c.on_fetch(&Request::navigate(url("/missing"))).await);
        assert_eq!(s.response.status, StatusCode::NOT_FOUND);
        assert!(
            c.storage()
                .match_request("offline-clicker-v1", &RequestKey::get(&url("/missing")))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn html_accept_header_counts_as_navigation() {
        let c = installed("v1").await;
        c.network().set_offline(true);
        let req = Request::get(url("/about")).with_accept("text/html").unwrap();
        let s = served(c.on_fetch(&req).await);
        assert_eq!(s.source, ResponseSource::RootDocument);
    }

    #[tokio::test]
    async fn cached_asset_never_touches_network() {
        let c = installed("v1").await;
        let calls = c.network().calls();
        let s = served(c.on_fetch(&Request::get(url("/style.css"))).await);
        assert_eq!(s.source, ResponseSource::Cache);
        assert_eq!(s.response.text(), "body{}");
        assert_eq!(c.network().calls(), calls);
    }

    #[tokio::test]
    async fn asset_miss_fetches_and_caches_plain_200() {
        let c = installed("v1").await;
        c.network().route("/icon.png", Response::ok(&b"\x89PNG"[..]).with_content_type("image/png"));

        let s = served(c.on_fetch(&image_request("/icon.png")).await);
        assert_eq!(s.source, ResponseSource::Network);

        c.network().set_offline(true);
        let s = served(c.on_fetch(&image_request("/icon.png")).await);
        assert_eq!(s.source, ResponseSource::Cache);
        assert_eq!(&s.response.body[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn opaque_and_error_responses_are_not_cached() {
        let c = installed("v1").await;
        c.network()
            .route("/cdn.js", Response::opaque());
        c.network().route_status("/gone.js", StatusCode::GONE);

        served(c.on_fetch(&Request::get(url("/cdn.js"))).await);
        let s = served(c.on_fetch(&Request::get(url("/gone.js"))).await);
        assert_eq!(s.response.status, StatusCode::GONE);

        let entries = c.storage().entries("offline-clicker-v1").await.unwrap();
        assert_eq!(entries.len(), 5);
    }

    #[tokio::test]
    async fn offline_image_gets_svg_placeholder() {
        let c = installed("v1").await;
        c.network().set_offline(true);
        let s = served(c.on_fetch(&image_request("/sprites/coin.png")).await);
        assert_eq!(s.source, ResponseSource::Placeholder);
        assert_eq!(s.response.content_type(), Some("image/svg+xml"));
        assert!(s.response.text().contains("Offline"));
    }

    #[tokio::test]
    async fn offline_non_image_asset_gets_root_document() {
        let c = installed("v1").await;
        c.network().set_offline(true);
        let s = served(c.on_fetch(&Request::get(url("/extra.js"))).await);
        assert_eq!(s.source, ResponseSource::RootDocument);
        assert_eq!(s.response.text(), "<html>index</html>");
    }

    #[tokio::test]
    async fn cold_cache_offline_still_answers() {
        let c = controller("v1");
        c.network().set_offline(true);
        let s = served(c.on_fetch(&Request::navigate(url("/"))).await);
        assert_eq!(s.source, ResponseSource::Unavailable);
        assert_eq!(s.response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn version_bump_moves_assets_to_new_store() {
        let storage = MemoryStorage::new();
        let net = MockNetwork::with_core_assets();
        let v3 = OfflineCacheController::new(config("v3"), storage, net).unwrap();
        v3.on_install().await.unwrap();
        v3.on_activate().await.unwrap();
        let OfflineCacheController { storage, network, .. } = v3;

        network.route("/style.css", Response::ok("body{color:gold}").with_content_type("text/css"));
        let v4 = OfflineCacheController::new(config("v4"), storage, network).unwrap();
        v4.on_install().await.unwrap();
        v4.on_activate().await.unwrap();

        assert_eq!(v4.storage().keys().await.unwrap(), vec!["offline-clicker-v4"]);
        v4.network().set_offline(true);
        let s = served(v4.on_fetch(&Request::get(url("/style.css"))).await);
        assert_eq!(s.source, ResponseSource::Cache);
        assert_eq!(s.response.text(), "body{color:gold}");
    }

    /// Storage whose reads and writes always fail.
    struct BrokenStorage;

    #[async_trait]
    impl CacheStorage for BrokenStorage {
        async fn open(&self, _name: &str) -> Result<bool> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn has(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }
        async fn put(&self, _name: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn match_request(&self, _name: &str, _key: &RequestKey) -> Result<Option<Response>> {
            Err(Error::Storage("disk unavailable".to_string()))
        }
        async fn entries(&self, _name: &str) -> Result<Vec<RequestKey>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn storage_errors_are_not_fatal() {
        let c = OfflineCacheController::new(config("v1"), BrokenStorage, MockNetwork::with_core_assets())
            .unwrap();
        let s = served(c.on_fetch(&Request::get(url("/style.css"))).await);
        assert_eq!(s.source, ResponseSource::Network);
        assert_eq!(s.response.text(), "body{}");
        assert_eq!(c.stats().snapshot().cache_writes, 0);

        assert!(matches!(c.on_install().await, Err(Error::Storage(_))));
    }
}
