//! Store abstraction shared by all cache backends.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::hash::compute_cache_key;
use crate::Error;

/// A cached response.
///
/// `cached_at` is written together with the payload; it is never injected
/// into the stored headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry keyed by method and canonical URL.
    pub fn new(
        method: &str, url: &str, status: u16, headers: Vec<(String, String)>, payload: Vec<u8>,
        cached_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: compute_cache_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status,
            headers,
            payload,
            cached_at,
        }
    }

    /// Whether the entry is younger than `ttl` at `now`.
    ///
    /// `None` means the entry never expires by time.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Option<std::time::Duration>) -> bool {
        match ttl {
            None => true,
            Some(ttl) => match Duration::from_std(ttl) {
                Ok(ttl) => now - self.cached_at < ttl,
                Err(_) => true,
            },
        }
    }

    /// Approximate bytes this entry occupies.
    pub fn size_bytes(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.payload.len() + headers + self.key.len() + self.url.len()) as u64
    }
}

/// Namespaced key/value byte store.
///
/// Concurrent `put` calls to the same key are last-write-wins. Writing into
/// a namespace that does not exist creates it.
#[async_trait]
pub trait StoreBackend: Send + Sync + std::fmt::Debug {
    /// Create the namespace if it does not exist yet.
    async fn create_namespace(&self, namespace: &str) -> Result<(), Error>;

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>, Error>;

    async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error>;

    /// Returns whether an entry was removed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, Error>;

    async fn list_namespaces(&self) -> Result<Vec<String>, Error>;

    /// Drop a namespace and all of its entries. Returns whether it existed.
    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error>;

    /// Aggregate bytes used across all namespaces.
    async fn usage_bytes(&self) -> Result<u64, Error>;
}

/// Handle to a single opened namespace.
#[derive(Debug, Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
    namespace: String,
}

impl Store {
    /// Open (creating if needed) `namespace` on `backend`.
    pub async fn open(backend: Arc<dyn StoreBackend>, namespace: impl Into<String>) -> Result<Self, Error> {
        let namespace = namespace.into();
        backend.create_namespace(&namespace).await?;
        Ok(Self { backend, namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.backend.get(&self.namespace, key).await
    }

    pub async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
        self.backend.put(&self.namespace, entry).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.backend.delete(&self.namespace, key).await
    }
}
