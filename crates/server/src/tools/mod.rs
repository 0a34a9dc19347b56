//! MCP tool implementations.
//!
//! This module contains all tools exposed by the rampart server.

pub mod control;
pub mod fetch;
pub mod rpc;

pub use control::{CacheControlParams, control_impl};
pub use fetch::{CacheFetchParams, fetch_impl};
pub use rpc::{RpcCallParams, rpc_impl};
