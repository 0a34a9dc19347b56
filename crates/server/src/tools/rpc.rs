//! rpc_call tool implementation.
//!
//! Queues one logical call on the request batcher and waits for its result.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rampart_client::RequestBatcher;
use rampart_core::Error;

/// Parameters for the rpc_call tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RpcCallParams {
    /// Procedure identifier understood by the batch endpoint.
    pub procedure: String,

    /// Arbitrary JSON input for the procedure.
    #[serde(default)]
    pub input: Value,
}

/// Output from the rpc_call tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RpcCallOutput {
    pub data: Value,
}

/// Implementation of the rpc_call tool.
pub async fn rpc_impl(batcher: Option<&RequestBatcher>, params: RpcCallParams) -> Result<CallToolResult, McpError> {
    let Some(batcher) = batcher else {
        return Err(Error::InvalidInput("batching is disabled: set batch.endpoint".into()).into());
    };

    if params.procedure.trim().is_empty() {
        return Err(Error::InvalidInput("procedure cannot be empty".into()).into());
    }

    let data = batcher.call(params.procedure, params.input).await?;

    let json = serde_json::to_string_pretty(&RpcCallOutput { data })
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rampart_client::batch::{BatchCall, BatchReply};
    use rampart_client::{BatchConfig, BatchError, BatchTransport};
    use std::sync::Arc;

    /// Answers `sum` calls, rejects everything else.
    struct SumTransport;

    #[async_trait]
    impl BatchTransport for SumTransport {
        async fn send(&self, calls: &[BatchCall]) -> Result<Vec<BatchReply>, BatchError> {
            Ok(calls
                .iter()
                .map(|c| match c.procedure.as_str() {
                    "sum" => {
                        let total: i64 = c.input.as_array().into_iter().flatten().filter_map(Value::as_i64).sum();
                        BatchReply::ok(c.id, total.into())
                    }
                    other => BatchReply::error(c.id, format!("no procedure {other}")),
                })
                .collect())
        }
    }

    fn batcher() -> RequestBatcher {
        RequestBatcher::new(Arc::new(SumTransport), BatchConfig::default())
    }

    #[tokio::test]
    async fn test_rpc_call_resolves() {
        let batcher = batcher();
        let params = RpcCallParams { procedure: "sum".into(), input: serde_json::json!([1, 2, 3]) };

        let result = rpc_impl(Some(&batcher), params).await.unwrap();
        let text = result.content[0].as_text().unwrap().text.clone();
        let output: RpcCallOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(output.data, serde_json::json!(6));
    }

    #[tokio::test]
    async fn test_rpc_item_error() {
        let batcher = batcher();
        let params = RpcCallParams { procedure: "divide".into(), input: Value::Null };

        let err = rpc_impl(Some(&batcher), params).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
        assert!(err.message.contains("no procedure divide"));
    }

    #[tokio::test]
    async fn test_rpc_disabled() {
        let params = RpcCallParams { procedure: "sum".into(), input: Value::Null };
        let err = rpc_impl(None, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
