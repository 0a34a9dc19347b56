//! rampart server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rampart_client::{
    BatchConfig, CacheEngine, ControlService, FetchClient, FetchConfig, HttpBatchTransport, RequestBatcher,
};
use rampart_core::{AppConfig, CacheDb, SystemClock};

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(app = %config.app_name, db = %config.db_path.display(), "Starting rampart server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let fetch_config = FetchConfig::from(&config);
    let fetcher = Arc::new(FetchClient::new(fetch_config.clone())?);
    let engine = Arc::new(CacheEngine::new(config.clone(), Arc::new(db), fetcher, Arc::new(SystemClock))?);

    match engine.install().await {
        Ok(()) if config.skip_waiting => engine.activate().await?,
        Ok(()) => tracing::info!("cache installed; waiting for take_over"),
        Err(e) => tracing::error!(error = %e, "cache install failed; cache_fetch is unavailable"),
    }

    let control = ControlService::spawn(engine.lifecycle());

    let batcher = match &config.batch.endpoint {
        Some(endpoint) => {
            let transport = HttpBatchTransport::new(engine.resolve(endpoint)?, &fetch_config)?;
            tracing::info!(endpoint = %transport.endpoint(), "request batching enabled");
            Some(Arc::new(RequestBatcher::new(Arc::new(transport), BatchConfig::from(&config.batch))))
        }
        None => None,
    };

    let handler = handler::RampartServer::new(engine, control, batcher);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
