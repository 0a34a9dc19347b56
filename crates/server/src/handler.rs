//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::{CacheControlParams, CacheFetchParams, RpcCallParams, control_impl, fetch_impl, rpc_impl};

use std::sync::Arc;

use rampart_client::{CacheEngine, ControlChannel, RequestBatcher};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for rampart.
#[derive(Clone)]
pub struct RampartServer {
    tool_router: ToolRouter<Self>,
    engine: Arc<CacheEngine>,
    control: ControlChannel,
    batcher: Option<Arc<RequestBatcher>>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl RampartServer {
    /// Create a new server handler.
    pub fn new(engine: Arc<CacheEngine>, control: ControlChannel, batcher: Option<Arc<RequestBatcher>>) -> Self {
        Self { tool_router: Self::tool_router(), engine, control, batcher }
    }

    /// Fetch a URL through the offline cache.
    #[tool(
        description = "Fetch a URL through the offline cache. Static assets and images are served cache-first, API calls and page navigations network-first with a stale fallback. Reports whether the body came from the network, the cache, a stale entry or the offline page."
    )]
    async fn cache_fetch(&self, params: Parameters<CacheFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.engine, params.0).await
    }

    /// Send a control message to the cache lifecycle.
    #[tool(
        description = "Manage the offline cache. 'take_over' activates the installed cache now, 'clear_all' deletes every cache namespace, 'report_size' returns usageBytes and quotaBytes."
    )]
    async fn cache_control(&self, params: Parameters<CacheControlParams>) -> Result<CallToolResult, McpError> {
        control_impl(&self.control, params.0).await
    }

    /// Make a logical RPC call through the request batcher.
    #[tool(
        description = "Call a remote procedure. Concurrent calls are coalesced into one batched HTTP request. Returns the procedure's data."
    )]
    async fn rpc_call(&self, params: Parameters<RpcCallParams>) -> Result<CallToolResult, McpError> {
        rpc_impl(self.batcher.as_deref(), params.0).await
    }
}

impl ServerHandler for RampartServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "rampart".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
