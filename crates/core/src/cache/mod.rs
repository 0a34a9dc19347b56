//! Namespaced response cache.
//!
//! Entries live in named namespaces (`{app}-{class}-v{version}`) behind the
//! [`StoreBackend`] trait. Two backends are provided:
//!
//! - [`CacheDb`]: persistent SQLite store with async access via tokio-rusqlite,
//!   WAL mode and automatic schema migrations
//! - [`MemoryStore`]: process-local map, used by tests

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use memory::MemoryStore;
pub use store::{CacheEntry, Store, StoreBackend};
