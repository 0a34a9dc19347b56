//! Request batching for logical RPC calls.
//!
//! # How it works
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Request Batcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  1. enqueue() hands the call to the collector task             │
//! │  2. The first call of a cycle arms the max_wait timer          │
//! │  3. max_batch_size calls or the timer flush the whole queue    │
//! │  4. One physical call goes out through the BatchTransport      │
//! │  5. Replies are matched by id back to each pending caller      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The collector task is the only owner of the queue, so a call is never
//! part of two physical batches. Calls that arrive while a flush is in
//! flight wait in the channel and start the next cycle.

pub mod error;
pub mod transport;
pub mod wire;

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

pub use error::BatchError;
pub use transport::{BatchTransport, HttpBatchTransport, parse_replies};
pub use wire::{BatchCall, BatchReply};

use rampart_core::Error;
use rampart_core::config::BatchSettings;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for request batching.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Calls per physical batch before an immediate flush.
    pub max_batch_size: usize,
    /// How long the first call of a cycle waits for company.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: 10, max_wait: Duration::from_millis(10) }
    }
}

impl From<&BatchSettings> for BatchConfig {
    fn from(settings: &BatchSettings) -> Self {
        Self { max_batch_size: settings.max_batch_size, max_wait: settings.max_wait() }
    }
}

/// Observable phase of the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatcherState {
    Idle,
    Collecting,
    Flushing,
}

/// Statistics for batching operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Logical calls sent.
    pub total_calls: u64,
    /// Physical batches sent.
    pub total_batches: u64,
    /// Size of the largest batch so far.
    pub largest_batch: usize,
}

impl BatchStats {
    pub fn avg_batch_size(&self) -> f64 {
        if self.total_batches == 0 {
            return 0.0;
        }
        self.total_calls as f64 / self.total_batches as f64
    }
}

#[derive(Debug)]
struct QueuedCall {
    id: u64,
    procedure: String,
    input: Value,
    reply: oneshot::Sender<Result<Value, BatchError>>,
}

/// Result of one enqueued call; resolves once its batch has been demultiplexed.
#[derive(Debug)]
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<Result<Value, BatchError>>,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value, BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| received.unwrap_or(Err(BatchError::Closed)))
    }
}

/// Coalesces concurrent calls into physical batches.
///
/// Dropping the batcher flushes whatever is still queued.
pub struct RequestBatcher {
    tx: mpsc::UnboundedSender<QueuedCall>,
    state: watch::Receiver<BatcherState>,
    stats: Arc<RwLock<BatchStats>>,
    config: BatchConfig,
}

impl RequestBatcher {
    /// Create a batcher and spawn its collector task.
    pub fn new(transport: Arc<dyn BatchTransport>, config: BatchConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(BatcherState::Idle);
        let stats = Arc::new(RwLock::new(BatchStats::default()));

        {
            let config = config.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                run_collector(transport, config, rx, state_tx, stats).await;
            });
        }

        Self { tx, state, stats, config }
    }

    /// Queue a call and return a handle to its result.
    pub fn enqueue(&self, procedure: impl Into<String>, input: Value) -> PendingCall {
        let id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        let call = QueuedCall { id, procedure: procedure.into(), input, reply };

        // a send failure drops the reply sender, which resolves the handle to Closed
        if self.tx.send(call).is_err() {
            warn!(id, "batcher collector is gone");
        }

        PendingCall { id, rx }
    }

    /// Queue a call and wait for its result.
    pub async fn call(&self, procedure: impl Into<String>, input: Value) -> Result<Value, Error> {
        self.enqueue(procedure, input).await.map_err(Error::from)
    }

    pub fn state(&self) -> BatcherState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatcherState> {
        self.state.clone()
    }

    pub async fn stats(&self) -> BatchStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

async fn run_collector(
    transport: Arc<dyn BatchTransport>, config: BatchConfig, mut rx: mpsc::UnboundedReceiver<QueuedCall>,
    state: watch::Sender<BatcherState>, stats: Arc<RwLock<BatchStats>>,
) {
    let mut queue: Vec<QueuedCall> = Vec::with_capacity(config.max_batch_size);
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = sleep_until(deadline.unwrap_or_else(Instant::now));

        tokio::select! {
            call = rx.recv() => match call {
                Some(call) => {
                    if queue.is_empty() {
                        deadline = Some(Instant::now() + config.max_wait);
                        state.send_replace(BatcherState::Collecting);
                    }
                    queue.push(call);

                    if queue.len() >= config.max_batch_size {
                        deadline = None;
                        flush(transport.as_ref(), &mut queue, &state, &stats).await;
                    }
                }
                None => {
                    if !queue.is_empty() {
                        flush(transport.as_ref(), &mut queue, &state, &stats).await;
                    }
                    break;
                }
            },
            _ = timer, if deadline.is_some() => {
                deadline = None;
                flush(transport.as_ref(), &mut queue, &state, &stats).await;
            }
        }
    }

    debug!("batch collector stopped");
}

async fn flush(
    transport: &dyn BatchTransport, queue: &mut Vec<QueuedCall>, state: &watch::Sender<BatcherState>,
    stats: &RwLock<BatchStats>,
) {
    let batch = std::mem::take(queue);
    let batch_size = batch.len();
    if batch_size == 0 {
        state.send_replace(BatcherState::Idle);
        return;
    }

    state.send_replace(BatcherState::Flushing);
    debug!(batch_size, "flushing batch");

    let mut calls = Vec::with_capacity(batch_size);
    let mut slots = HashMap::with_capacity(batch_size);
    for QueuedCall { id, procedure, input, reply } in batch {
        calls.push(BatchCall { id, procedure, input });
        slots.insert(id, reply);
    }

    let outcome = transport.send(&calls).await;

    {
        let mut s = stats.write().await;
        s.total_calls += batch_size as u64;
        s.total_batches += 1;
        s.largest_batch = s.largest_batch.max(batch_size);
        debug!(size = batch_size, avg_size = s.avg_batch_size(), ok = outcome.is_ok(), "batch sent");
    }

    match outcome {
        Ok(replies) => {
            for reply in replies {
                match slots.remove(&reply.id()) {
                    Some(slot) => {
                        let _ = slot.send(reply.into_result());
                    }
                    None => warn!(id = reply.id(), "batch reply for unknown or already answered call"),
                }
            }
            for (id, slot) in slots {
                warn!(id, "batch response has no result for call");
                let _ = slot.send(Err(BatchError::ProtocolViolation(format!("no result for call {id}"))));
            }
        }
        Err(e) => {
            warn!(batch_size, error = %e, "batch transport failed");
            for slot in slots.into_values() {
                let _ = slot.send(Err(e.clone()));
            }
        }
    }

    state.send_replace(BatcherState::Idle);
}
