//! Test doubles shared by the controller, lifecycle and server tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::network::Network;

pub const SCOPE: &str = "https://example.com/";

pub fn url(path: &str) -> Url {
    Url::parse(SCOPE).unwrap().join(path).unwrap()
}

pub fn config(version: &str) -> CacheConfig {
    CacheConfig::new()
        .with_prefix("offline-clicker")
        .with_version(version)
        .with_scope(SCOPE)
}

/// Scripted network: answers from a route table, can be switched offline,
/// and counts every fetch it sees.
#[derive(Debug, Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the clicker's five core assets.
    pub fn with_core_assets() -> Self {
        let net = Self::new();
        net.route("/", Response::ok("<html>root</html>").with_content_type("text/html"));
        net.route("/index.html", Response::ok("<html>index</html>").with_content_type("text/html"));
        net.route("/style.css", Response::ok("body{}").with_content_type("text/css"));
        net.route("/script.js", Response::ok("run()").with_content_type("text/javascript"));
        net.route("/manifest.json", Response::ok("{}").with_content_type("application/json"));
        net
    }

    pub fn route(&self, path: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), response);
    }

    pub fn route_status(&self, path: &str, status: StatusCode) {
        self.route(path, Response::new(status, "error"));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self, path: &str) -> bool {
        let target = url(path).to_string();
        self.seen.lock().unwrap().iter().any(|u| *u == target)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.url.to_string());
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        self.routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| Error::Network(format!("no route for {}", request.url)))
    }
}
