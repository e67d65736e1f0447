//! # tidings
//!
//! Demo subscription server: wires the notifier, the `serverTime` executor
//! and the HTTP/WebSocket server together, then ticks until ctrl-c.

#![deny(unsafe_code)]

mod timeserver;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tidings_notify::LocalNotifier;
use tidings_server::{ServerConfig, SubscriptionConfig, SubscriptionHandler, SubscriptionServer};
use tidings_settings::TidingsSettings;
use tidings_telemetry::{TelemetryConfig, init_telemetry};

/// GraphQL subscription server streaming `serverTime`.
#[derive(Parser, Debug)]
#[command(name = "tidings", about = "GraphQL-over-WebSocket subscription server")]
struct Cli {
    /// Settings file (defaults to `~/.tidings/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Milliseconds between `serverTime` notifications.
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(10..))]
    tick_ms: u64,
}

impl Cli {
    fn server_config(&self, settings: &TidingsSettings) -> ServerConfig {
        let mut config = ServerConfig::from_settings(&settings.server);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(tidings_settings::settings_path);
    let settings = tidings_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    init_telemetry(&TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ))
    .context("Failed to initialize logging")?;
    let metrics =
        tidings_telemetry::metrics::install_recorder().context("Failed to install metrics")?;

    let notifier = Arc::new(LocalNotifier::new());
    let handler = SubscriptionHandler::new(
        Arc::new(timeserver::ServerTimeExecutor),
        notifier.clone(),
        SubscriptionConfig::from_settings(&settings.subscriptions),
    );
    let server =
        SubscriptionServer::new(cli.server_config(&settings), handler).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    let ticker = timeserver::spawn_ticker(
        notifier,
        Duration::from_millis(cli.tick_ms),
        server.shutdown().token(),
    );
    tracing::info!(
        %addr,
        path = %server.config().path,
        tick_ms = cli.tick_ms,
        "tidings ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server
        .shutdown()
        .graceful_shutdown(vec![handle, ticker], None)
        .await
    {
        tracing::warn!("some tasks did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
