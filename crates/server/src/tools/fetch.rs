//! cache_fetch tool implementation.
//!
//! Routes a request through the cache engine and reports where the answer came from.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use rampart_client::{CacheEngine, Destination, LifecycleState, Request};
use rampart_core::Error;

/// Input parameters for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET). Anything other than GET bypasses the cache.
    #[serde(default = "default_method")]
    pub method: String,

    /// Resource type: "document" (full-page navigation), "image", "script",
    /// "style", "font", "manifest" or "empty" (default).
    #[serde(default)]
    pub destination: Option<String>,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchOutput {
    /// Canonical URL that was requested.
    pub url: String,
    pub status: u16,
    /// One of "network", "cache", "stale" or "offline".
    pub source: String,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    /// ISO8601 timestamp of when a cached body was stored.
    pub cached_at: Option<String>,
}

/// Implementation of the cache_fetch tool.
pub async fn fetch_impl(engine: &CacheEngine, params: CacheFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let state = engine.state();
    if state != LifecycleState::Active {
        return Err(Error::NotActive(format!("cache engine is {state:?}; send take_over to activate")).into());
    }

    let destination = match params.destination.as_deref() {
        Some(d) => d.parse::<Destination>().map_err(Error::InvalidInput)?,
        None => Destination::Empty,
    };

    let mut request = Request::get(engine.resolve(&params.url)?)
        .with_method(&params.method)
        .with_destination(destination);
    if let Some(accept) = params.accept {
        request = request.with_header("accept", accept);
    }

    let response = engine.handle(&request).await?;

    let output = CacheFetchOutput {
        url: request.url.to_string(),
        status: response.status,
        source: response.source.as_str().to_string(),
        content_type: response.header("content-type").map(String::from),
        body: String::from_utf8_lossy(&response.body).into_owned(),
        cached_at: response.cached_at.map(|t| t.to_rfc3339()),
        headers: response.headers,
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
