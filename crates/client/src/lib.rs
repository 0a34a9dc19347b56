//! Client side of rampart.
//!
//! This crate provides the HTTP fetch pipeline, the offline cache engine
//! with its lifecycle and control channel, and the request batcher used by
//! the server.

pub mod batch;
pub mod engine;
pub mod fetch;
pub mod request;

#[cfg(test)]
mod testing;

pub use batch::{
    BatchConfig, BatchError, BatchStats, BatchTransport, BatcherState, HttpBatchTransport, PendingCall, RequestBatcher,
};
pub use engine::{
    CacheEngine, ControlChannel, ControlMessage, ControlReply, ControlService, LifecycleManager, LifecycleState,
    StorageEstimate, Strategy, StrategySelector,
};
pub use fetch::{FetchClient, FetchConfig, Fetcher, canonicalize};
pub use request::{Destination, Request, Response, ResponseSource};
