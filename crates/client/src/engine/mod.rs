//! Offline cache engine.
//!
//! A [`CacheEngine`] ties the pieces together:
//! - [`StrategySelector`] picks the policy class of a request
//! - [`CacheFirstHandler`] serves `static` and `image` subresources
//! - [`NetworkFirstHandler`] serves `api` calls and full-page navigations
//! - [`LifecycleManager`] gates request handling on install and activation
//!
//! Clock, store and network are injected, so the whole engine runs against
//! [`rampart_core::MemoryStore`] and a mock fetcher in tests.

pub mod cache_first;
pub mod control;
pub mod lifecycle;
pub mod network_first;
pub mod selector;

use std::sync::Arc;

pub use cache_first::CacheFirstHandler;
pub use control::{ControlChannel, ControlEnvelope, ControlMessage, ControlReply, ControlResponse, ControlService};
pub use lifecycle::{LifecycleManager, LifecycleState, StorageEstimate};
pub use network_first::{NetworkFirstHandler, OfflinePage, offline_document};
pub use selector::{Strategy, StrategySelector};

use crate::fetch::{Fetcher, canonicalize};
use crate::request::{Request, Response};
use rampart_core::{AppConfig, Clock, Error, PolicyClass, Store, StoreBackend};

/// Routes requests through the cache according to their policy class.
pub struct CacheEngine {
    config: AppConfig,
    backend: Arc<dyn StoreBackend>,
    fetcher: Arc<dyn Fetcher>,
    selector: StrategySelector,
    cache_first: CacheFirstHandler,
    network_first: NetworkFirstHandler,
    lifecycle: Arc<LifecycleManager>,
}

impl CacheEngine {
    /// Build an engine in the `Installing` state.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the origin, a precache seed or the
    /// offline page is not a valid URL.
    pub fn new(
        config: AppConfig, backend: Arc<dyn StoreBackend>, fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let lifecycle = LifecycleManager::new(&config, backend.clone(), fetcher.clone(), clock.clone())?;
        let offline_page = Self::offline_page(&config)?;

        Ok(Self {
            selector: StrategySelector::new(config.api_prefixes.clone()),
            cache_first: CacheFirstHandler::new(fetcher.clone(), clock.clone()),
            network_first: NetworkFirstHandler::new(fetcher.clone(), clock, backend.clone(), offline_page),
            lifecycle: Arc::new(lifecycle),
            config,
            backend,
            fetcher,
        })
    }

    fn offline_page(config: &AppConfig) -> Result<Option<OfflinePage>, Error> {
        let Some(path) = &config.offline_page else {
            return Ok(None);
        };
        let origin = canonicalize(&config.origin, None).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let url = canonicalize(path, Some(&origin)).map_err(|e| Error::InvalidUrl(format!("offline page: {e}")))?;

        Ok(Some(OfflinePage {
            namespace: config.namespace(PolicyClass::Static).name(),
            key: Request::get(url).cache_key(),
        }))
    }

    /// Handle one request once the engine is active.
    ///
    /// Non-GET requests bypass the store and go straight to the network.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotActive` if install failed, or the network error
    /// when neither network nor store can answer.
    pub async fn handle(&self, request: &Request) -> Result<Response, Error> {
        self.lifecycle.wait_active().await?;

        if !request.is_get() {
            tracing::debug!(method = %request.method, url = %request.url, "bypassing cache");
            return self.fetcher.fetch(request).await;
        }

        let class = self.selector.select(request);
        let store = Store::open(self.backend.clone(), self.config.namespace(class).name()).await?;

        match Strategy::for_request(request, class) {
            Strategy::CacheFirst => self.cache_first.handle(&store, request).await,
            Strategy::NetworkFirst => self.network_first.handle(&store, request, self.config.ttl_for(class)).await,
        }
    }

    /// Resolve `input` against the configured origin.
    pub fn resolve(&self, input: &str) -> Result<url::Url, Error> {
        let origin = canonicalize(&self.config.origin, None).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        canonicalize(input, Some(&origin)).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    pub async fn install(&self) -> Result<(), Error> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<(), Error> {
        self.lifecycle.activate().await
    }

    pub async fn take_over(&self) -> Result<(), Error> {
        self.lifecycle.take_over().await
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        self.lifecycle.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
