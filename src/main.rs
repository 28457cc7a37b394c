//! # Fit Gateway - Main Entry Point
//!
//! Loads the configuration (environment, or the YAML file named by
//! `GATEWAY_CONFIG_PATH`), installs logging, builds the route table and serves until
//! Ctrl-C or SIGTERM.

use anyhow::Context;
use tracing::{error, info};

use fit_gateway::observability::init_logging;
use fit_gateway::{GatewayConfig, GatewayServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::load()
        .await
        .context("failed to load gateway configuration")?;

    init_logging(&config.logging);

    info!("Starting Fit Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        users = %config.services.users,
        trainings = %config.services.trainings,
        metrics = %config.services.metrics,
        goals = %config.services.goals,
        "Backends configured"
    );

    let server = GatewayServer::from_config(&config).map_err(|e| {
        error!("Failed to build gateway: {}", e);
        e
    })?;

    server.start().await?;

    info!("Fit Gateway shutdown complete");
    Ok(())
}
