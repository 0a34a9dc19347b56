//! Cache-first strategy: a store hit never touches the network.

use std::sync::Arc;

use crate::fetch::Fetcher;
use crate::request::{Request, Response, ResponseSource};
use rampart_core::{Clock, Error, Store};

/// Serves from the store when possible, otherwise fetches and stores 2xx responses.
#[derive(Clone)]
pub struct CacheFirstHandler {
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
}

impl CacheFirstHandler {
    pub fn new(fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>) -> Self {
        Self { fetcher, clock }
    }

    /// Handle `request` against `store`.
    ///
    /// A failed store read counts as a miss and a failed store write still
    /// returns the live response. Network errors on a miss propagate as-is.
    pub async fn handle(&self, store: &Store, request: &Request) -> Result<Response, Error> {
        let key = request.cache_key();

        match store.get(&key).await {
            Ok(Some(entry)) => {
                tracing::debug!(url = %request.url, namespace = store.namespace(), "cache hit");
                return Ok(Response::from_entry(entry, ResponseSource::Cache));
            }
            Ok(None) => tracing::debug!(url = %request.url, namespace = store.namespace(), "cache miss"),
            Err(e) => tracing::warn!(url = %request.url, error = %e, "cache read failed, fetching"),
        }

        let response = self.fetcher.fetch(request).await?;

        if response.is_success() {
            let entry = response.to_entry(request, self.clock.now());
            if let Err(e) = store.put(&entry).await {
                tracing::warn!(url = %request.url, error = %e, "cache write failed");
            }
        }

        Ok(response)
    }
}
