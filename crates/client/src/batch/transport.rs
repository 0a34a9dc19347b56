//! Physical transport for batched calls.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;
use url::Url;

use super::error::BatchError;
use super::wire::{BatchCall, BatchReply};
use crate::fetch::FetchConfig;
use rampart_core::Error;

/// Sends one physical batch and returns its reply elements.
///
/// Replies may arrive in any order and need not cover every call; the
/// batcher matches them by id.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send(&self, calls: &[BatchCall]) -> Result<Vec<BatchReply>, BatchError>;
}

/// POSTs the batch as a JSON array to a single endpoint.
#[derive(Debug, Clone)]
pub struct HttpBatchTransport {
    http: Client,
    endpoint: Url,
}

impl HttpBatchTransport {
    /// Create a transport for `endpoint`.
    ///
    /// There is no request timeout on the physical call, only on connecting.
    pub fn new(endpoint: Url, config: &FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn send(&self, calls: &[BatchCall]) -> Result<Vec<BatchReply>, BatchError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .json(calls)
            .send()
            .await
            .map_err(|e| BatchError::Transport(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BatchError::Transport(format!("{} returned status {}", self.endpoint, status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BatchError::Transport(format!("failed to read batch response: {e}")))?;

        parse_replies(&body)
    }
}

/// Parse a batch response body.
///
/// A body that is not a JSON array is a protocol violation. Elements that do
/// not match either reply shape are skipped, so their calls end up without a
/// result.
pub fn parse_replies(body: &str) -> Result<Vec<BatchReply>, BatchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BatchError::ProtocolViolation(format!("batch response is not JSON: {e}")))?;

    let Value::Array(elements) = value else {
        return Err(BatchError::ProtocolViolation("batch response is not an array".into()));
    };

    let replies = elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value::<BatchReply>(element) {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed batch reply element");
                None
            }
        })
        .collect();

    Ok(replies)
}
