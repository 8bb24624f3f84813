//! Keel server
//!
//! Startup order: tracing, configuration, registry (seeded if configured),
//! listeners, then the control and snapshot routers until Ctrl-C.

use anyhow::{Context, Result};
use keel_server::repository::Registry;
use keel_server::service::Effects;
use keel_server::{Config, Listeners, Server, seed};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Keel server...");

    let config = load_config()?;
    info!(
        "Loaded configuration: control_addr={}, snapshot_addr={}, idle_timeout={:?}",
        config.control_addr, config.snapshot_addr, config.idle_timeout
    );

    let registry = match &config.seed_file {
        Some(path) => seed::load_registry(path)?,
        None => {
            info!("No seed file configured, starting with an empty registry");
            Registry::new()
        }
    };

    let listeners = Listeners::bind(&config).await?;
    let server = Server::new(&config, registry, Effects::logging());

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.run(listeners, shutdown).await?;

    info!("Keel server stopped");
    Ok(())
}

/// Loads configuration from environment variables; unusable values are fatal
fn load_config() -> Result<Config> {
    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
