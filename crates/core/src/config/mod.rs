//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RAMPART_*)
//! 2. TOML config file (if RAMPART_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::policy::{CacheNamespace, PolicyClass};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RAMPART_*), nested keys split on `__`
/// 2. TOML config file (if RAMPART_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name used as the namespace prefix.
    ///
    /// Set via RAMPART_APP_NAME environment variable.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Origin that relative URLs (precache seeds, batch endpoint) resolve against.
    ///
    /// Set via RAMPART_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache database.
    ///
    /// Set via RAMPART_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via RAMPART_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Transport timeout for cache-engine fetches in milliseconds.
    ///
    /// Set via RAMPART_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via RAMPART_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Critical resources written to the `static` namespace at install time.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Precached page served to navigations when both network and cache fail.
    #[serde(default = "default_offline_page")]
    pub offline_page: Option<String>,

    /// Path prefixes that mark a request as `api`.
    #[serde(default = "default_api_prefixes")]
    pub api_prefixes: Vec<String>,

    /// Current namespace version per policy class.
    #[serde(default)]
    pub versions: NamespaceVersions,

    /// Freshness window for `api` entries used as network-failure fallback.
    ///
    /// Set via RAMPART_API_CACHE_TTL_MS environment variable.
    #[serde(default = "default_api_cache_ttl_ms")]
    pub api_cache_ttl_ms: u64,

    /// Storage quota reported by REPORT_SIZE, if known.
    #[serde(default)]
    pub quota_bytes: Option<u64>,

    /// Activate immediately after install instead of waiting for TAKE_OVER.
    ///
    /// Set via RAMPART_SKIP_WAITING environment variable.
    #[serde(default)]
    pub skip_waiting: bool,

    /// Request batching window.
    #[serde(default)]
    pub batch: BatchSettings,
}

/// Namespace version per policy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceVersions {
    #[serde(default = "default_version", rename = "static")]
    pub static_: u32,
    #[serde(default = "default_version")]
    pub image: u32,
    #[serde(default = "default_version")]
    pub api: u32,
}

impl Default for NamespaceVersions {
    fn default() -> Self {
        Self { static_: 1, image: 1, api: 1 }
    }
}

impl NamespaceVersions {
    pub fn get(&self, class: PolicyClass) -> u32 {
        match class {
            PolicyClass::Static => self.static_,
            PolicyClass::Image => self.image,
            PolicyClass::Api => self.api,
        }
    }
}

/// Size/time thresholds of the request batcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Flush as soon as this many calls are queued.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Flush this long after the first call of a batch was queued.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Endpoint receiving batched calls. Batching is disabled when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_batch_size: default_max_batch_size(), max_wait_ms: default_max_wait_ms(), endpoint: None }
    }
}

impl BatchSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

fn default_app_name() -> String {
    "rampart".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./rampart-cache.sqlite")
}

fn default_user_agent() -> String {
    "rampart/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_precache() -> Vec<String> {
    vec!["/".into(), "/offline.html".into(), "/manifest.json".into()]
}

fn default_offline_page() -> Option<String> {
    Some("/offline.html".into())
}

fn default_api_prefixes() -> Vec<String> {
    vec!["/api/".into()]
}

fn default_api_cache_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_version() -> u32 {
    1
}

fn default_max_batch_size() -> usize {
    10
}

fn default_max_wait_ms() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            api_prefixes: default_api_prefixes(),
            versions: NamespaceVersions::default(),
            api_cache_ttl_ms: default_api_cache_ttl_ms(),
            quota_bytes: None,
            skip_waiting: false,
            batch: BatchSettings::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// TTL of the `api` namespace.
    pub fn api_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.api_cache_ttl_ms)
    }

    /// Freshness window for entries of `class`; `None` means they never expire.
    pub fn ttl_for(&self, class: PolicyClass) -> Option<Duration> {
        class.expires().then(|| self.api_cache_ttl())
    }

    /// Current namespace for `class`.
    pub fn namespace(&self, class: PolicyClass) -> CacheNamespace {
        CacheNamespace::new(&self.app_name, class, self.versions.get(class))
    }

    /// Names that survive activation.
    pub fn namespace_allow_list(&self) -> Vec<String> {
        PolicyClass::ALL.iter().map(|c| self.namespace(*c).name()).collect()
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RAMPART_`
    /// 2. TOML file from `RAMPART_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RAMPART_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RAMPART_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
