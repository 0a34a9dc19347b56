//! In-memory [`StoreBackend`].

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::store::{CacheEntry, StoreBackend};
use crate::Error;

/// Process-local store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<BTreeMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn create_namespace(&self, namespace: &str) -> Result<(), Error> {
        self.namespaces.write().await.entry(namespace.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
        self.namespaces
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, Error> {
        let mut namespaces = self.namespaces.write().await;
        Ok(namespaces.get_mut(namespace).is_some_and(|ns| ns.remove(key).is_some()))
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        Ok(self.namespaces.read().await.keys().cloned().collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error> {
        Ok(self.namespaces.write().await.remove(namespace).is_some())
    }

    async fn usage_bytes(&self) -> Result<u64, Error> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.values().flat_map(|ns| ns.values()).map(CacheEntry::size_bytes).sum())
    }
}
