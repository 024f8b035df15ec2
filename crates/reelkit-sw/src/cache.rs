//! Versioned cache stores: entry snapshots, the host store abstraction and
//! the in-memory reference backend.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::fetch::{Request, Response, ResponseKind};
use crate::SwError;

/// Normalized store key for a request: uppercase method plus the URL with any
/// fragment removed. Fragments never reach the network, so two URLs differing
/// only in fragment are the same resource.
pub fn request_key(method: &str, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    format!("{} {}", method.to_ascii_uppercase(), url)
}

/// A stored response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request method the entry is keyed under.
    pub method: String,
    /// Request URL the entry is keyed under.
    pub url: Url,
    /// Response status.
    pub status: u16,
    /// Response reason phrase.
    pub status_text: String,
    /// Response headers, names lowercase.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
    /// Response visibility at fetch time.
    pub kind: ResponseKind,
    /// When the entry was stored, in milliseconds since the epoch.
    pub stored_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for storage.
    ///
    /// A response body belongs to exactly one consumer, so the proxy copies
    /// it: one copy goes back to the caller, this snapshot goes to the store.
    /// With [`Bytes`] bodies the copy is a reference-count bump.
    pub fn snapshot(request: &Request, response: &Response) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            kind: response.kind,
            stored_at: epoch_millis(),
        }
    }

    /// The store key this entry lives under.
    pub fn key(&self) -> String {
        request_key(&self.method, &self.url)
    }

    /// Rebuild a response from this snapshot, marked as served from cache.
    /// Status, headers and body come back verbatim.
    pub fn into_response(self) -> Response {
        Response {
            url: self.url,
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: self.body,
            kind: self.kind,
            from_cache: true,
        }
    }
}

fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Host-provided registry of named cache stores.
///
/// One store holds the shell assets of one deployed version. Implementations
/// apply each operation atomically; there are no cross-entry transactions,
/// and concurrent writes to the same key are last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a store, creating it if absent.
    async fn open(&self, cache: &str) -> Result<(), SwError>;

    /// Whether a store exists.
    async fn has(&self, cache: &str) -> Result<bool, SwError>;

    /// Delete a store and all its entries. Returns whether it existed.
    async fn delete(&self, cache: &str) -> Result<bool, SwError>;

    /// Names of all stores, across every application and version.
    async fn keys(&self) -> Result<Vec<String>, SwError>;

    /// Write an entry into an existing store.
    ///
    /// Writing into a store that does not exist is an error: a store deleted
    /// by an activation sweep must not be resurrected by a late write.
    async fn put(&self, cache: &str, entry: CacheEntry) -> Result<(), SwError>;

    /// Look up an entry by request key. A missing store is an ordinary miss.
    async fn match_key(&self, cache: &str, key: &str) -> Result<Option<CacheEntry>, SwError>;

    /// Request keys present in a store, in no particular order.
    async fn entry_keys(&self, cache: &str) -> Result<Vec<String>, SwError>;
}

/// In-memory [`CacheStorage`] backend.
///
/// The reference implementation used by tests and the smoke harness; hosts
/// with persistent storage plug in their own.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryCacheStorage {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a store, if it exists.
    pub async fn entry_count(&self, cache: &str) -> Option<usize> {
        self.stores.read().await.get(cache).map(|store| store.len())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, cache: &str) -> Result<(), SwError> {
        self.stores
            .write()
            .await
            .entry(cache.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, cache: &str) -> Result<bool, SwError> {
        Ok(self.stores.read().await.contains_key(cache))
    }

    async fn delete(&self, cache: &str) -> Result<bool, SwError> {
        Ok(self.stores.write().await.remove(cache).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, SwError> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> Result<(), SwError> {
        let mut stores = self.stores.write().await;
        let store = stores
            .get_mut(cache)
            .ok_or_else(|| SwError::Cache(format!("no such store: {}", cache)))?;
        store.insert(entry.key(), entry);
        Ok(())
    }

    async fn match_key(&self, cache: &str, key: &str) -> Result<Option<CacheEntry>, SwError> {
        Ok(self
            .stores
            .read()
            .await
            .get(cache)
            .and_then(|store| store.get(key))
            .cloned())
    }

    async fn entry_keys(&self, cache: &str) -> Result<Vec<String>, SwError> {
        Ok(self
            .stores
            .read()
            .await
            .get(cache)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default())
    }
}
