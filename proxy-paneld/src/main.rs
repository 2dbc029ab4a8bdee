mod api;
mod backup;
mod collaborators;
mod config;
mod controller;
mod db;
mod error;
mod lifecycle;
mod proxy;
mod status;
mod ttl_cache;
mod versions;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::controller::{Collaborators, ControllerSettings, ServerController};
use crate::db::store::SqliteStore;
use crate::proxy::config_file::ConfigFile;
use crate::proxy::keygen::BinaryKeyGenerator;
use crate::proxy::logs::LogReader;
use crate::proxy::supervisor::ProcessSupervisor;
use crate::status::collector::SystemCollector;
use crate::versions::feed::ReleaseFeed;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("proxy_paneld=info"))
        )
        .init();

    tracing::info!("Starting proxy-paneld");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/proxy-panel/paneld.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Open SQLite database
    let store = SqliteStore::open(&config.database.path)?;
    tracing::info!("Opened database at {:?}", config.database.path);

    let supervisor = Arc::new(ProcessSupervisor::new(&config.proxy));
    if config.proxy.autostart {
        if let Err(e) = supervisor.start().await {
            tracing::error!("Failed to start proxy: {:#}", e);
        }
    }

    let collaborators = Collaborators {
        supervisor: supervisor.clone(),
        collector: Arc::new(SystemCollector::new(supervisor.clone())),
        versions: Arc::new(ReleaseFeed::new(&config.versions)?),
        store: Arc::new(store),
        logs: Arc::new(LogReader::new(&config.proxy)),
        proxy_config: Arc::new(ConfigFile::new(config.proxy.config.clone())),
        keys: Arc::new(BinaryKeyGenerator::new(&config.proxy)),
    };

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Controller spawns the status poller
    let (controller, poller_handle) = ServerController::start(
        collaborators,
        ControllerSettings::from_config(&config),
        cancel.clone(),
    );

    // Build API router
    let app = api::routes::router(api::routes::AppState { controller });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(poller_handle, server_handle);

    // Stop the proxy we started
    if let Err(e) = supervisor.shutdown().await {
        tracing::error!("Failed to stop proxy: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
