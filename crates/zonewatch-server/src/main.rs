//! # zonewatch-server
//!
//! HTTP server for the zonewatch geofencing subsystem.
//!
//! This binary provides:
//! - REST API for zones, monitored regions and device callbacks
//! - Location updates posted to the configured webhook
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package zonewatch-server
//!
//! # With an explicit config file
//! ZONEWATCH_CONFIG=/etc/zonewatch/config.toml ./zonewatch-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use zonewatch_core::{default_config_path, ZonewatchConfig};
use zonewatch_server::api::create_router;
use zonewatch_server::logging;
use zonewatch_server::state::AppState;

/// Overrides the platform config file location.
const CONFIG_PATH_ENV: &str = "ZONEWATCH_CONFIG";

fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .or_else(|| default_config_path().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path();
    let config = ZonewatchConfig::load(path.as_deref()).context("invalid configuration")?;

    logging::init(config.server.production)?;

    info!(
        config = ?path,
        webhook_configured = config.server.webhook_url.is_some(),
        "Starting zonewatch-server"
    );

    let bind_address = config.server.bind_address.clone();
    let state = AppState::new(config)?;

    let report = state.coordinator().initialize().await?;
    info!(
        added = report.added.len(),
        failed = report.failed.len(),
        "region monitoring started"
    );

    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!("Listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.coordinator().shutdown();
    info!("zonewatch-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
}
