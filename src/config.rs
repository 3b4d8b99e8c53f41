//! Configuration for the cache controller, its storage and the proxy server.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::http::resolve;

/// Configuration for the offline cache controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix of the cache store name.
    pub prefix: String,
    /// Version tag; bump it to evict every older store on activation.
    pub version: String,
    /// Origin (and path) whose requests the controller intercepts.
    pub scope: String,
    /// Assets precached at install, relative to `scope`.
    pub core_assets: Vec<String>,
    /// Document served when a navigation or asset has nothing better.
    pub root_document: String,
    /// Activate as soon as install succeeds instead of waiting.
    pub skip_waiting: bool,
    /// Number of core assets fetched concurrently during install.
    pub install_concurrency: usize,
    /// Per-request network timeout in seconds. `None` waits indefinitely.
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "offline-clicker".to_string(),
            version: "v1".to_string(),
            scope: "http://127.0.0.1:8000/".to_string(),
            core_assets: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./style.css".to_string(),
                "./script.js".to_string(),
                "./manifest.json".to_string(),
            ],
            root_document: "./index.html".to_string(),
            skip_waiting: true,
            install_concurrency: 4,
            fetch_timeout_secs: None,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the cache version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the scope URL.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Replaces the core asset list.
    #[must_use]
    pub fn with_core_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the root document path.
    #[must_use]
    pub fn with_root_document(mut self, root: impl Into<String>) -> Self {
        self.root_document = root.into();
        self
    }

    /// Sets whether the worker activates right after install.
    #[must_use]
    pub const fn with_skip_waiting(mut self, skip: bool) -> Self {
        self.skip_waiting = skip;
        self
    }

    /// Sets the install fetch concurrency.
    #[must_use]
    pub const fn with_install_concurrency(mut self, concurrency: usize) -> Self {
        self.install_concurrency = concurrency;
        self
    }

    /// Sets the per-request network timeout.
    #[must_use]
    pub const fn with_fetch_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    /// Returns the name of the store owned by this version.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.prefix, self.version)
    }

    /// Parses the scope URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `scope` is not an absolute URL.
    pub fn scope_url(&self) -> Result<Url> {
        Url::parse(&self.scope).map_err(|e| Error::Config(format!("invalid scope {}: {e}", self.scope)))
    }

    /// Resolves the core asset list against the scope.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the scope or any asset is invalid.
    pub fn core_asset_urls(&self) -> Result<Vec<Url>> {
        let scope = self.scope_url()?;
        self.core_assets
            .iter()
            .map(|asset| resolve(&scope, asset))
            .collect()
    }

    /// Resolves the root document against the scope.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the scope or root path is invalid.
    pub fn root_document_url(&self) -> Result<Url> {
        resolve(&self.scope_url()?, &self.root_document)
    }

    /// Checks the configuration for values the controller cannot work with.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() || self.version.is_empty() {
            return Err(Error::Config("prefix and version must not be empty".to_string()));
        }
        if self.install_concurrency == 0 {
            return Err(Error::Config("install_concurrency must be at least 1".to_string()));
        }
        self.core_asset_urls()?;
        self.root_document_url()?;
        Ok(())
    }
}

/// Which cache store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Entries live in memory and vanish on exit.
    Memory,
    /// Entries are persisted under `StorageConfig::dir`.
    #[default]
    Disk,
}

/// Cache store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Root directory for the disk backend.
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Disk,
            dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("offline-cache")
                .join("stores"),
        }
    }
}

/// Proxy server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9723,
        }
    }
}

/// Complete application configuration combining cache, storage and server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller configuration.
    pub cache: CacheConfig,
    /// Store configuration.
    pub storage: StorageConfig,
    /// Server configuration.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offline-cache")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Loads configuration, writing a default template first if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be written or the file cannot be parsed.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Saves the configuration atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml_str)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
