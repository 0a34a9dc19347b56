//! cache_control tool implementation.
//!
//! Sends one control message over the correlation channel and returns its reply.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use rampart_client::{ControlChannel, ControlMessage};
use rampart_core::Error;

/// Parameters for the cache_control tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheControlParams {
    /// One of "take_over", "clear_all" or "report_size".
    pub message: String,
}

/// Implementation of the cache_control tool.
pub async fn control_impl(control: &ControlChannel, params: CacheControlParams) -> Result<CallToolResult, McpError> {
    let message: ControlMessage = params.message.parse()?;
    let reply = control.send(message).await?;

    let json = serde_json::to_string_pretty(&reply)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize reply: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
