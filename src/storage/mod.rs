//! Named cache stores of captured responses.
//!
//! A [`CacheStorage`] holds any number of named stores, each mapping a
//! [`RequestKey`] to a captured [`Response`]. The controller owns exactly one
//! store name at a time and only ever opens, reads, writes and deletes by
//! name. Individual operations are atomic; nothing here spans several keys.

mod disk;
mod memory;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::http::{RequestKey, Response, ResponseType};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Abstraction over the cache store backend.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named store, creating it if absent.
    ///
    /// Returns `true` if the store was created by this call.
    async fn open(&self, name: &str) -> Result<bool>;

    /// Returns true if the named store exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Lists store names in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes the named store. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Stores `response` under `key`, creating the store if needed.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

    /// Looks up `key` in the named store.
    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Lists the keys held by the named store. Empty if the store is missing.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;

    /// Stores every pair in order, stopping at the first failure.
    async fn put_all(&self, name: &str, items: &[(RequestKey, Response)]) -> Result<()> {
        for (key, response) in items {
            self.put(name, key, response).await?;
        }
        Ok(())
    }
}

/// Rejects store names that cannot be used as a single path component.
pub(crate) fn validate_store_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(Error::Storage(format!("invalid store name: {name:?}")));
    }
    Ok(())
}

/// Serialized form of a cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Request identity.
    pub key: RequestKey,
    /// Status code.
    pub status: u16,
    /// Header name/value pairs in order.
    pub headers: Vec<(String, String)>,
    /// Headers whose values are not visible ASCII, base64-encoded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_headers: Vec<(String, String)>,
    /// Response type.
    pub kind: ResponseType,
    /// Base64-encoded body.
    pub body: String,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Captures a response for storage.
    #[must_use]
    pub fn capture(key: &RequestKey, response: &Response) -> Self {
        let mut headers = Vec::new();
        let mut binary_headers = Vec::new();
        for (name, value) in &response.headers {
            let name = name.as_str().to_string();
            match value.to_str() {
                Ok(v) => headers.push((name, v.to_string())),
                Err(_) => binary_headers.push((name, BASE64.encode(value.as_bytes()))),
            }
        }
        Self {
            key: key.clone(),
            status: response.status.as_u16(),
            headers,
            binary_headers,
            kind: response.kind,
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        }
    }

    /// Rebuilds the response.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the status, a header or the body is malformed.
    pub fn into_response(self) -> Result<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| Error::Storage(format!("{}: bad status: {e}", self.key)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Storage(format!("{}: bad header name: {e}", self.key)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Storage(format!("{}: bad header value: {e}", self.key)))?;
            headers.append(name, value);
        }
        for (name, value) in &self.binary_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Storage(format!("{}: bad header name: {e}", self.key)))?;
            let bytes = BASE64
                .decode(value)
                .map_err(|e| Error::Storage(format!("{}: bad header value: {e}", self.key)))?;
            let value = HeaderValue::from_bytes(&bytes)
                .map_err(|e| Error::Storage(format!("{}: bad header value: {e}", self.key)))?;
            headers.append(name, value);
        }
        let body = BASE64
            .decode(&self.body)
            .map_err(|e| Error::Storage(format!("{}: bad body: {e}", self.key)))?;
        Ok(Response {
            status,
            headers,
            body: body.into(),
            kind: self.kind,
        })
    }
}
