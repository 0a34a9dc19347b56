//! Core types and shared functionality for rampart.
//!
//! This crate provides:
//! - Namespaced cache store with SQLite and in-memory backends
//! - Policy classes and versioned namespace naming
//! - Clock abstraction for freshness checks
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod policy;

pub use cache::{CacheDb, CacheEntry, MemoryStore, Store, StoreBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::Error;
pub use policy::{CacheNamespace, PolicyClass};
