//! Cache stores persisted to disk.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<store-name>/store.json        creation metadata
//! <root>/<store-name>/<sha256>.json     one file per cached request
//! ```
//!
//! Entry file names are the SHA-256 of the request key, so any URL maps to a
//! safe file name. Writes go to a temporary file that is renamed into place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CacheStorage, StoredEntry, validate_store_name};
use crate::error::Result;
use crate::http::{RequestKey, Response};

const METADATA_FILE: &str = "store.json";

/// Distinguishes temporary files of concurrent writers to the same entry.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    name: String,
    created: DateTime<Utc>,
}

/// Cache stores persisted as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.store_dir(name).join(format!("{digest:x}.json"))
    }

    async fn write_atomic(path: &Path, contents: Vec<u8>) -> Result<()> {
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_metadata(dir: &Path) -> Option<StoreMetadata> {
        let contents = tokio::fs::read(dir.join(METADATA_FILE)).await.ok()?;
        serde_json::from_slice(&contents).ok()
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<bool> {
        validate_store_name(name)?;
        let dir = self.store_dir(name);
        if tokio::fs::metadata(dir.join(METADATA_FILE)).await.is_ok() {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&dir).await?;
        let metadata = StoreMetadata {
            name: name.to_string(),
            created: Utc::now(),
        };
        Self::write_atomic(&dir.join(METADATA_FILE), serde_json::to_vec(&metadata)?).await?;
        log::debug!("Created cache store {name} at {}", dir.display());
        Ok(true)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        validate_store_name(name)?;
        Ok(tokio::fs::metadata(self.store_dir(name).join(METADATA_FILE))
            .await
            .is_ok())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stores = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(metadata) = Self::read_metadata(&entry.path()).await {
                stores.push(metadata);
            }
        }
        stores.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        Ok(stores.into_iter().map(|m| m.name).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_store_name(name)?;
        match tokio::fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        self.open(name).await?;
        let entry = StoredEntry::capture(key, response);
        Self::write_atomic(&self.entry_path(name, key), serde_json::to_vec(&entry)?).await
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        validate_store_name(name)?;
        let contents = match tokio::fs::read(self.entry_path(name, key)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: StoredEntry = serde_json::from_slice(&contents)?;
        entry.into_response().map(Some)
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        validate_store_name(name)?;
        let mut read_dir = match tokio::fs::read_dir(self.store_dir(name)).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let is_entry = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|n| n != METADATA_FILE);
            if !is_entry {
                continue;
            }
            let contents = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<StoredEntry>(&contents) {
                Ok(stored) => keys.push(stored.key),
                Err(e) => log::warn!("Skipping unreadable cache entry {}: {e}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;
    use tempfile::TempDir;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("https://example.com/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn keys_empty_without_root() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().join("missing"));
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_put_match() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());

        assert!(storage.open("app-v1").await.unwrap());
        assert!(!storage.open("app-v1").await.unwrap());

        let response = Response::ok("body{}").with_content_type("text/css");
        storage.put("app-v1", &key("/style.css"), &response).await.unwrap();

        let hit = storage
            .match_request("app-v1", &key("/style.css"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.text(), "body{}");
        assert_eq!(hit.content_type(), Some("text/css"));
        assert!(storage.match_request("app-v1", &key("/x.css")).await.unwrap().is_none());
        assert_eq!(storage.entries("app-v1").await.unwrap(), vec![key("/style.css")]);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = DiskStorage::new(dir.path());
            storage.put("app-v3", &key("/"), &Response::ok("<html>")).await.unwrap();
        }
        let storage = DiskStorage::new(dir.path());
        assert_eq!(storage.keys().await.unwrap(), vec!["app-v3"]);
        let hit = storage.match_request("app-v3", &key("/")).await.unwrap().unwrap();
        assert_eq!(hit.text(), "<html>");
    }

    #[tokio::test]
    async fn delete_removes_store() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        storage.open("old").await.unwrap();
        storage.open("new").await.unwrap();

        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["new"]);
        assert!(!dir.path().join("old").exists());
    }

    #[tokio::test]
    async fn ignores_foreign_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("not-a-store")).unwrap();
        let storage = DiskStorage::new(dir.path());
        storage.open("app-v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["app-v1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_of_one_key_all_succeed() {
        let dir = TempDir::new().unwrap();
        let storage = std::sync::Arc::new(DiskStorage::new(dir.path()));
        storage.open("app-v1").await.unwrap();

        for round in 0..20 {
            let writers: Vec<_> = (0..8)
                .map(|i| {
                    let storage = std::sync::Arc::clone(&storage);
                    tokio::spawn(async move {
                        let body = format!("round {round} writer {i}");
                        storage.put("app-v1", &key("/"), &Response::ok(body)).await
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap().unwrap();
            }

            let hit = storage.match_request("app-v1", &key("/")).await.unwrap().unwrap();
            assert!(hit.text().starts_with(&format!("round {round} writer ")));
        }

        assert_eq!(storage.entries("app-v1").await.unwrap(), vec![key("/")]);
        let leftovers = std::fs::read_dir(dir.path().join("app-v1"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());
        assert!(storage.open("../outside").await.is_err());
        assert!(storage.delete("..").await.is_err());
    }
}
