//! convoyd — logistics/alert network daemon.

use anyhow::{Context, Result};

use convoy_core::config::ConvoyConfig;
use convoy_services::EventLog;
use convoyd::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = ConvoyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ConvoyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ConvoyConfig::default()
    });
    tracing::info!(port = config.network.port, "convoyd starting");

    let event_log =
        EventLog::open(&config.log.event_log_path).context("failed to open event log")?;

    let server = Server::start(&config, event_log)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        let _ = shutdown.send(());
    });

    server.wait().await
}
