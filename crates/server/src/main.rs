//! offcache server entry point.
//!
//! Loads configuration, opens the cache database, registers the caching
//! worker for the configured origin and serves MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offcache_client::{FetchConfig, HttpNetwork, Registration, RegistrationCallbacks};
use offcache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = Arc::new(AppConfig::load()?);
    tracing::info!(
        origin = %config.origin,
        version = %config.cache_version,
        "Starting offcache server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(HttpNetwork::new(FetchConfig::from(config.as_ref()))?);

    let callbacks = RegistrationCallbacks::new()
        .on_success(|worker| tracing::info!(version = worker.version(), "content is cached for offline use"))
        .on_update(|worker| tracing::info!(version = worker.version(), "new content is available"))
        .on_offline_ready(|| tracing::info!("app is ready to work offline"));
    let registration = Arc::new(Registration::new(&config, db.clone(), network, callbacks)?);

    let worker = registration.worker(&config)?;
    if let Err(e) = registration.register(worker).await {
        tracing::error!(error = %e, "worker failed to install; requests go straight to the network");
    }

    let handler = handler::OffcacheServer::new(registration, db, config);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
