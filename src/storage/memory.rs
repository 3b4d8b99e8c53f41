//! In-memory cache stores.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStorage, validate_store_name};
use crate::error::Result;
use crate::http::{RequestKey, Response};

type Store = HashMap<RequestKey, Response>;

/// Cache stores held in process memory.
///
/// Stores are kept in creation order so `keys` matches the platform's
/// `caches.keys()` ordering.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<Vec<(String, Store)>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<bool> {
        validate_store_name(name)?;
        let mut stores = self.stores.write().await;
        if stores.iter().any(|(n, _)| n == name) {
            return Ok(false);
        }
        stores.push((name.to_string(), Store::new()));
        Ok(true)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.read().await.iter().any(|(n, _)| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() != before)
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        validate_store_name(name)?;
        let mut stores = self.stores.write().await;
        if let Some((_, store)) = stores.iter_mut().find(|(n, _)| n == name) {
            store.insert(key.clone(), response.clone());
        } else {
            let mut store = Store::new();
            store.insert(key.clone(), response.clone());
            stores.push((name.to_string(), store));
        }
        Ok(())
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, store)| store.get(key).cloned()))
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let stores = self.stores.read().await;
        let mut keys: Vec<RequestKey> = stores
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, store)| store.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
