//! Test doubles shared by the engine tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use rampart_core::{CacheEntry, Error, MemoryStore, StoreBackend};

/// Fetcher answering from a fixed route table and counting calls.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, (u16, String)>>,
    oversized: Mutex<Vec<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(&self, url: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), (status, body.to_string()));
    }

    /// Make `url` fail as if its body exceeded the size limit.
    pub(crate) fn mark_oversized(&self, url: &str) {
        self.oversized.lock().unwrap().push(url.to_string());
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }
        if self.oversized.lock().unwrap().iter().any(|u| u == request.url.as_str()) {
            return Err(Error::FetchTooLarge(format!("{}: body over limit", request.url)));
        }
        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(match route {
            Some((status, body)) => Response::network(status, vec![("content-type".into(), "text/plain".into())], body),
            None => Response::network(404, vec![], "not found"),
        })
    }
}

/// Store that delegates to [`MemoryStore`] but can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_put_url: Mutex<Option<String>>,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail only `put` calls whose entry URL is `url`.
    pub(crate) fn fail_put_for(&self, url: &str) {
        *self.fail_put_url.lock().unwrap() = Some(url.to_string());
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<(), Error> {
        if flag.load(Ordering::SeqCst) { Err(Error::CorruptEntry(format!("injected {op} failure"))) } else { Ok(()) }
    }
}

#[async_trait]
impl StoreBackend for FlakyStore {
    async fn create_namespace(&self, namespace: &str) -> Result<(), Error> {
        self.check(&self.fail_writes, "create")?;
        self.inner.create_namespace(namespace).await
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.check(&self.fail_reads, "get")?;
        self.inner.get(namespace, key).await
    }

    async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
        self.check(&self.fail_writes, "put")?;
        if self.fail_put_url.lock().unwrap().as_deref() == Some(entry.url.as_str()) {
            return Err(Error::CorruptEntry(format!("injected put failure for {}", entry.url)));
        }
        self.inner.put(namespace, entry).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, Error> {
        self.check(&self.fail_writes, "delete")?;
        self.inner.delete(namespace, key).await
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        self.check(&self.fail_reads, "list")?;
        self.inner.list_namespaces().await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error> {
        self.check(&self.fail_writes, "delete_namespace")?;
        self.inner.delete_namespace(namespace).await
    }

    async fn usage_bytes(&self) -> Result<u64, Error> {
        self.check(&self.fail_reads, "usage")?;
        self.inner.usage_bytes().await
    }
}
