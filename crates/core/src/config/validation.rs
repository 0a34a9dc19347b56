//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `app_name` is empty
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `api_cache_ttl_ms` is 0
    /// - `batch.max_batch_size` is 0 or exceeds 1000
    /// - `batch.max_wait_ms` exceeds 10 seconds
    /// - an API prefix does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.is_empty() {
            return Err(ConfigError::Invalid { field: "app_name".into(), reason: "must not be empty".into() });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.api_cache_ttl_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "api_cache_ttl_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.batch.max_batch_size == 0 || self.batch.max_batch_size > 1000 {
            return Err(ConfigError::Invalid {
                field: "batch.max_batch_size".into(),
                reason: "must be between 1 and 1000".into(),
            });
        }
        if self.batch.max_wait_ms > 10_000 {
            return Err(ConfigError::Invalid {
                field: "batch.max_wait_ms".into(),
                reason: "must not exceed 10 seconds (10000ms)".into(),
            });
        }

        if let Some(prefix) = self.api_prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "api_prefixes".into(),
                reason: format!("prefix {prefix:?} must start with '/'"),
            });
        }

        if let Some(page) = &self.offline_page
            && !self.precache.contains(page)
        {
            tracing::warn!(
                offline_page = %page,
                "offline_page is not in the precache list; navigations will fall back to the built-in document"
            );
        }

        Ok(())
    }
}
