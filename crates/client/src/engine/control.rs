//! Correlation-id control protocol for external cache management.
//!
//! Callers hold a [`ControlChannel`]; each [`send`](ControlChannel::send)
//! registers a oneshot slot under a fresh id, ships a [`ControlEnvelope`] to
//! the service task and awaits the matching [`ControlResponse`]. Every
//! message is handled on its own task so a failing or panicking handler
//! still produces exactly one reply.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};

use super::lifecycle::{LifecycleManager, StorageEstimate};
use rampart_core::Error;

/// Messages understood by the control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Finish install and activate immediately.
    TakeOver,
    /// Delete every known namespace.
    ClearAll,
    /// Report store usage and quota.
    ReportSize,
}

impl FromStr for ControlMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "take_over" => Ok(ControlMessage::TakeOver),
            "clear_all" => Ok(ControlMessage::ClearAll),
            "report_size" => Ok(ControlMessage::ReportSize),
            other => Err(Error::InvalidInput(format!("unknown control message: {other}"))),
        }
    }
}

/// Reply to a single control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
    /// Reply to TAKE_OVER and CLEAR_ALL, or any failed message.
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Reply to REPORT_SIZE; `None` when usage is unavailable.
    Size(Option<StorageEstimate>),
}

impl ControlReply {
    pub fn ok() -> Self {
        ControlReply::Ack { success: true, error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ControlReply::Ack { success: false, error: Some(error.into()) }
    }
}

/// A message tagged with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    pub id: u64,
    pub message: ControlMessage,
}

/// A reply tagged with the id of the message it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub id: u64,
    pub reply: ControlReply,
}

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<ControlReply>>>>;

/// Caller side of the control protocol.
#[derive(Clone)]
pub struct ControlChannel {
    next_id: Arc<AtomicU64>,
    pending: PendingReplies,
    outbound: mpsc::UnboundedSender<ControlEnvelope>,
}

impl ControlChannel {
    /// Send `message` and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns `Error::ControlClosed` if the service stopped before replying.
    pub async fn send(&self, message: ControlMessage) -> Result<ControlReply, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outbound.send(ControlEnvelope { id, message }).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ControlClosed);
        }

        rx.await.map_err(|_| Error::ControlClosed)
    }

    /// Number of messages still waiting for a reply.
    pub async fn outstanding(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Service side of the control protocol.
pub struct ControlService;

impl ControlService {
    /// Spawn the service and reply-router tasks and return a channel to them.
    ///
    /// Both tasks stop once every clone of the returned channel is dropped.
    pub fn spawn(lifecycle: Arc<LifecycleManager>) -> ControlChannel {
        let (outbound, mut inbound) = mpsc::unbounded_channel::<ControlEnvelope>();
        let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<ControlResponse>();
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                let lifecycle = lifecycle.clone();
                let replies = replies_tx.clone();
                tokio::spawn(async move {
                    let response = Self::handle_envelope(lifecycle, envelope).await;
                    let _ = replies.send(response);
                });
            }
            tracing::debug!("control service stopped");
        });

        let router_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(response) = replies_rx.recv().await {
                match router_pending.lock().await.remove(&response.id) {
                    Some(slot) => {
                        let _ = slot.send(response.reply);
                    }
                    None => tracing::warn!(id = response.id, "reply for unknown control message"),
                }
            }
        });

        ControlChannel { next_id: Arc::new(AtomicU64::new(1)), pending, outbound }
    }

    /// Handle one envelope to completion, always producing a response.
    ///
    /// Usable directly by transports that bring their own correlation.
    pub async fn handle_envelope(lifecycle: Arc<LifecycleManager>, envelope: ControlEnvelope) -> ControlResponse {
        let ControlEnvelope { id, message } = envelope;
        tracing::debug!(id, ?message, "control message received");

        let handler = tokio::spawn(async move { dispatch(&lifecycle, message).await });
        let reply = match handler.await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(id, error = %e, "control handler aborted");
                ControlReply::failure(format!("handler aborted: {e}"))
            }
        };

        ControlResponse { id, reply }
    }
}

async fn dispatch(lifecycle: &LifecycleManager, message: ControlMessage) -> ControlReply {
    match message {
        ControlMessage::TakeOver => match lifecycle.take_over().await {
            Ok(()) => ControlReply::ok(),
            Err(e) => ControlReply::failure(e.to_string()),
        },
        ControlMessage::ClearAll => match lifecycle.clear_all().await {
            Ok(_) => ControlReply::ok(),
            Err(e) => ControlReply::failure(e.to_string()),
        },
        ControlMessage::ReportSize => match lifecycle.report_size().await {
            Ok(estimate) => ControlReply::Size(Some(estimate)),
            Err(e) => {
                tracing::warn!(error = %e, "storage usage unavailable");
                ControlReply::Size(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lifecycle::LifecycleState;
    use crate::testing::{FlakyStore, MockFetcher};
    use async_trait::async_trait;
    use rampart_core::{AppConfig, CacheEntry, ManualClock, MemoryStore, StoreBackend};

    const ORIGIN: &str = "http://localhost:3000";

    fn config() -> AppConfig {
        AppConfig { app_name: "shop".into(), origin: ORIGIN.into(), precache: vec!["/".into()], ..Default::default() }
    }

    fn lifecycle(backend: Arc<dyn StoreBackend>) -> Arc<LifecycleManager> {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.route(&format!("{ORIGIN}/"), 200, "home");
        Arc::new(LifecycleManager::new(&config(), backend, fetcher, Arc::new(ManualClock::default())).unwrap())
    }

    /// Backend whose enumeration panics.
    #[derive(Debug, Default)]
    struct PanickingStore(MemoryStore);

    #[async_trait]
    impl StoreBackend for PanickingStore {
        async fn create_namespace(&self, namespace: &str) -> Result<(), Error> {
            self.0.create_namespace(namespace).await
        }
        async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
            self.0.get(namespace, key).await
        }
        async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
            self.0.put(namespace, entry).await
        }
        async fn delete(&self, namespace: &str, key: &str) -> Result<bool, Error> {
            self.0.delete(namespace, key).await
        }
        async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
            panic!("namespace enumeration exploded")
        }
        async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error> {
            self.0.delete_namespace(namespace).await
        }
        async fn usage_bytes(&self) -> Result<u64, Error> {
            self.0.usage_bytes().await
        }
    }

    #[test]
    fn test_message_parse() {
        assert_eq!("take_over".parse::<ControlMessage>().unwrap(), ControlMessage::TakeOver);
        assert_eq!("CLEAR_ALL".parse::<ControlMessage>().unwrap(), ControlMessage::ClearAll);
        assert!(matches!("reboot".parse::<ControlMessage>(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_wire_format() {
        let envelope = ControlEnvelope { id: 7, message: ControlMessage::ReportSize };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "message": {"type": "REPORT_SIZE"}}));

        let ok = serde_json::to_value(ControlReply::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true}));

        let unavailable: ControlReply = serde_json::from_str("null").unwrap();
        assert_eq!(unavailable, ControlReply::Size(None));
    }

    #[tokio::test]
    async fn test_take_over_activates() {
        let lifecycle = lifecycle(Arc::new(MemoryStore::new()));
        let channel = ControlService::spawn(lifecycle.clone());

        let reply = channel.send(ControlMessage::TakeOver).await.unwrap();
        assert_eq!(reply, ControlReply::ok());
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_clear_all_and_report_size() {
        let backend: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let channel = ControlService::spawn(lifecycle(backend.clone()));
        channel.send(ControlMessage::TakeOver).await.unwrap();

        let ControlReply::Size(Some(before)) = channel.send(ControlMessage::ReportSize).await.unwrap() else {
            panic!("expected a size report");
        };
        assert!(before.usage_bytes > 0);
        assert_eq!(before.quota_bytes, None);

        assert_eq!(channel.send(ControlMessage::ClearAll).await.unwrap(), ControlReply::ok());
        assert!(backend.list_namespaces().await.unwrap().is_empty());

        let after = channel.send(ControlMessage::ReportSize).await.unwrap();
        assert_eq!(after, ControlReply::Size(Some(StorageEstimate { usage_bytes: 0, quota_bytes: None })));
    }

    #[tokio::test]
    async fn test_concurrent_messages_each_get_one_reply() {
        let channel = ControlService::spawn(lifecycle(Arc::new(MemoryStore::new())));

        let mut handles = Vec::new();
        for i in 0..20 {
            let channel = channel.clone();
            let message = if i % 2 == 0 { ControlMessage::ReportSize } else { ControlMessage::TakeOver };
            handles.push(tokio::spawn(async move { channel.send(message).await }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(channel.outstanding().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_still_replies() {
        let flaky = Arc::new(FlakyStore::new());
        let channel = ControlService::spawn(lifecycle(flaky.clone()));
        flaky.fail_reads(true);

        let clear = channel.send(ControlMessage::ClearAll).await.unwrap();
        assert!(matches!(clear, ControlReply::Ack { success: false, error: Some(_) }));

        let size = channel.send(ControlMessage::ReportSize).await.unwrap();
        assert_eq!(size, ControlReply::Size(None));

        flaky.fail_writes(true);
        let take_over = channel.send(ControlMessage::TakeOver).await.unwrap();
        assert!(matches!(take_over, ControlReply::Ack { success: false, .. }));
    }

    #[tokio::test]
    async fn test_panicking_handler_still_replies() {
        let channel = ControlService::spawn(lifecycle(Arc::new(PanickingStore::default())));

        let reply = channel.send(ControlMessage::ClearAll).await.unwrap();
        let ControlReply::Ack { success, error } = reply else {
            panic!("expected an ack");
        };
        assert!(!success);
        assert!(error.unwrap().contains("aborted"));

        // the service keeps running after a handler panic
        let size = channel.send(ControlMessage::ReportSize).await.unwrap();
        assert!(matches!(size, ControlReply::Size(Some(_))));
    }
}
