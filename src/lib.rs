//! offline-cache - An offline-first cache controller for static web apps.
//!
//! The controller keeps one versioned cache store of a site's core assets,
//! precaches them on install, drops older versions on activate, and answers
//! each request network-first (page loads) or cache-first (everything else),
//! falling back to the cache, the root document or an "Offline" placeholder
//! image when the network is gone.
//!
//! # Example
//!
//! ```no_run
//! use offline_cache::{
//!     CacheConfig, HttpNetwork, MemoryStorage, OfflineCacheController, Request,
//!     ServiceWorkerHost, build_http_client,
//! };
//!
//! # async fn example() -> offline_cache::Result<()> {
//! let config = CacheConfig::new()
//!     .with_scope("https://example.com/clicker/")
//!     .with_version("v4");
//! let network = HttpNetwork::new(build_http_client(None)?, config.scope_url()?);
//! let controller = OfflineCacheController::new(config, MemoryStorage::new(), network)?;
//!
//! // Precache the core assets and take control.
//! let host = ServiceWorkerHost::new(controller);
//! host.start().await?;
//!
//! let url = reqwest::Url::parse("https://example.com/clicker/style.css").unwrap();
//! let served = host.handle(&Request::get(url)).await?;
//! println!("{} bytes from {}", served.response.body.len(), served.source.as_str());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod controller;
pub mod error;
pub mod format;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod save;
#[cfg(feature = "server")]
pub mod server;
pub mod stats;
pub mod storage;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, CacheConfig, ServerConfig, StorageBackend, StorageConfig};
pub use controller::{FetchOutcome, InstallReport, OfflineCacheController, ResponseSource, Served};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration};
pub use http::{Request, RequestKey, RequestMode, Response, ResponseType};
pub use lifecycle::{ServiceWorkerHost, WorkerState};
pub use network::{HttpNetwork, Network, OfflineNetwork, build_http_client};
pub use save::{GameState, SaveFile};
pub use stats::{CacheStats, StatsSnapshot};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage};
pub use strategy::{RequestClass, offline_placeholder};
