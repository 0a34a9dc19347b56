//! Store lifecycle: install, activate, and cache management operations.
//!
//! ```text
//! Installing ──install()──▶ Installed ──activate()──▶ Activating ──▶ Active
//!     │                                                    │
//!     └──precache failed──▶ Redundant        cleanup failed└──▶ Installed
//! ```
//!
//! Every transition holds the same mutex, so install always finishes (or
//! fails as a whole) before activation starts. Request handling waits on the
//! state watch channel until `Active`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

use crate::fetch::{Fetcher, canonicalize};
use crate::request::{Request, Response};
use rampart_core::{AppConfig, CacheEntry, CacheNamespace, Clock, Error, PolicyClass, Store, StoreBackend};

/// Lifecycle state of the cache engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
    /// Install failed; this engine never serves requests.
    Redundant,
}

/// Aggregate store usage, as reported by REPORT_SIZE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEstimate {
    pub usage_bytes: u64,
    pub quota_bytes: Option<u64>,
}

/// Drives install/activate and owns namespace cleanup.
pub struct LifecycleManager {
    app_name: String,
    static_namespace: String,
    allow_list: Vec<String>,
    seeds: Vec<Request>,
    quota_bytes: Option<u64>,
    backend: Arc<dyn StoreBackend>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<LifecycleState>,
    transition: Mutex<()>,
}

impl LifecycleManager {
    /// Build a manager in the `Installing` state.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the origin or a precache entry is not a valid URL.
    pub fn new(
        config: &AppConfig, backend: Arc<dyn StoreBackend>, fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let origin = canonicalize(&config.origin, None).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let seeds = config
            .precache
            .iter()
            .map(|path| {
                canonicalize(path, Some(&origin))
                    .map(Request::get)
                    .map_err(|e| Error::InvalidUrl(format!("precache {path}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (state, _) = watch::channel(LifecycleState::Installing);

        Ok(Self {
            app_name: config.app_name.clone(),
            static_namespace: config.namespace(PolicyClass::Static).name(),
            allow_list: config.namespace_allow_list(),
            seeds,
            quota_bytes: config.quota_bytes,
            backend,
            fetcher,
            clock,
            state,
            transition: Mutex::new(()),
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Precache the seed set into the `static` namespace.
    ///
    /// All-or-nothing: if any seed fails to fetch or returns a non-2xx status,
    /// nothing is written. If a write fails, the writes made by this install
    /// are rolled back and entries that were already in the namespace stay.
    /// Either way the manager becomes `Redundant`.
    ///
    /// A `Redundant` manager may install again. Calling it after a successful
    /// install is a no-op.
    pub async fn install(&self) -> Result<(), Error> {
        let _guard = self.transition.lock().await;

        match self.state() {
            LifecycleState::Installing => {}
            LifecycleState::Redundant => {
                tracing::info!(namespace = %self.static_namespace, "retrying install");
                self.state.send_replace(LifecycleState::Installing);
            }
            _ => return Ok(()),
        }

        match self.precache().await {
            Ok(count) => {
                tracing::info!(namespace = %self.static_namespace, resources = count, "install complete");
                self.state.send_replace(LifecycleState::Installed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "install failed");
                self.state.send_replace(LifecycleState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let mut fetches = JoinSet::new();
        for request in self.seeds.iter().cloned() {
            let fetcher = self.fetcher.clone();
            fetches.spawn(async move {
                let result = fetcher.fetch(&request).await;
                (request, result)
            });
        }

        let mut fetched: Vec<(Request, Response)> = Vec::with_capacity(self.seeds.len());
        while let Some(joined) = fetches.join_next().await {
            let (request, result) = joined.map_err(|e| Error::InstallFailed(format!("precache task failed: {e}")))?;
            let response = result.map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{} returned status {}", request.url, response.status)));
            }
            fetched.push((request, response));
        }

        let existed = self
            .backend
            .list_namespaces()
            .await
            .map_err(|e| Error::InstallFailed(format!("listing namespaces: {e}")))?
            .contains(&self.static_namespace);

        let store = Store::open(self.backend.clone(), self.static_namespace.clone())
            .await
            .map_err(|e| Error::InstallFailed(format!("opening {}: {e}", self.static_namespace)))?;

        let now = self.clock.now();
        let mut written: Vec<(String, Option<CacheEntry>)> = Vec::with_capacity(fetched.len());
        for (request, response) in &fetched {
            let entry = response.to_entry(request, now);
            let result = match store.get(&entry.key).await {
                Ok(prior) => store.put(&entry).await.map(|()| prior),
                Err(e) => Err(e),
            };
            match result {
                Ok(prior) => written.push((entry.key, prior)),
                Err(e) => {
                    self.roll_back(&store, existed, written).await;
                    return Err(Error::InstallFailed(format!("writing {}: {e}", request.url)));
                }
            }
        }

        Ok(fetched.len())
    }

    /// Undo the writes of a failed precache.
    ///
    /// A namespace created by this install is dropped whole. Otherwise each
    /// written key gets its previous entry back, or is removed if it had none.
    async fn roll_back(&self, store: &Store, existed: bool, written: Vec<(String, Option<CacheEntry>)>) {
        if !existed {
            if let Err(e) = self.backend.delete_namespace(store.namespace()).await {
                tracing::warn!(namespace = %store.namespace(), error = %e, "failed to discard partial precache");
            }
            return;
        }

        for (key, prior) in written.into_iter().rev() {
            let restored = match prior {
                Some(entry) => store.put(&entry).await,
                None => store.delete(&key).await.map(|_| ()),
            };
            if let Err(e) = restored {
                tracing::warn!(key = %key, error = %e, "failed to roll back precache entry");
            }
        }
    }

    /// Delete namespaces of this app that are not on the current allow-list,
    /// then become `Active`.
    ///
    /// Namespaces owned by other apps are left alone. Activating an already
    /// active manager is a no-op.
    pub async fn activate(&self) -> Result<(), Error> {
        let _guard = self.transition.lock().await;

        match self.state() {
            LifecycleState::Installed => {}
            LifecycleState::Active => return Ok(()),
            other => return Err(Error::InvalidState(format!("cannot activate while {other:?}"))),
        }

        self.state.send_replace(LifecycleState::Activating);

        match self.cleanup().await {
            Ok(deleted) => {
                tracing::info!(deleted = ?deleted, "activation complete");
                self.state.send_replace(LifecycleState::Active);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "activation failed");
                self.state.send_replace(LifecycleState::Installed);
                Err(e)
            }
        }
    }

    async fn cleanup(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.backend.list_namespaces().await? {
            if CacheNamespace::is_owned_by(&name, &self.app_name) && !self.allow_list.contains(&name) {
                match CacheNamespace::parse(&name) {
                    Some(ns) => tracing::debug!(
                        namespace = %name,
                        class = %ns.policy_class,
                        version = ns.version,
                        "removing superseded namespace"
                    ),
                    None => tracing::debug!(namespace = %name, "removing unrecognized namespace"),
                }
                self.backend.delete_namespace(&name).await?;
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Finish any pending install and activate now, without waiting.
    ///
    /// A `Redundant` manager installs again first.
    pub async fn take_over(&self) -> Result<(), Error> {
        if matches!(self.state(), LifecycleState::Installing | LifecycleState::Redundant) {
            self.install().await?;
        }
        self.activate().await
    }

    /// Resolve once the manager is `Active`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotActive` if the manager became `Redundant`.
    pub async fn wait_active(&self) -> Result<(), Error> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|s| matches!(s, LifecycleState::Active | LifecycleState::Redundant))
            .await
            .map_err(|_| Error::NotActive("lifecycle manager dropped".into()))?;

        match state {
            LifecycleState::Active => Ok(()),
            _ => Err(Error::NotActive("install failed".into())),
        }
    }

    /// Delete every known namespace. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize, Error> {
        let mut removed = 0;
        for name in self.backend.list_namespaces().await? {
            if self.backend.delete_namespace(&name).await? {
                removed += 1;
            }
        }
        tracing::info!(removed, "cleared all namespaces");
        Ok(removed)
    }

    pub async fn report_size(&self) -> Result<StorageEstimate, Error> {
        let usage_bytes = self.backend.usage_bytes().await?;
        Ok(StorageEstimate { usage_bytes, quota_bytes: self.quota_bytes })
    }
}
