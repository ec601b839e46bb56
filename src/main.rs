//! # board
//!
//! Project chat hub binary: loads settings, starts telemetry and metrics,
//! serves the hub, and shuts down cleanly on Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use board_hub::{HubConfig, HubServer};
use board_settings::BoardSettings;
use board_telemetry::TelemetryConfig;
use clap::Parser;

/// Live project chat hub.
#[derive(Parser, Debug)]
#[command(name = "board", about = "Live project chat hub")]
struct Cli {
    /// Settings file (default `~/.board/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<BoardSettings> {
        let path = self.config.clone().unwrap_or_else(board_settings::settings_path);
        let mut settings = board_settings::load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    board_telemetry::init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
    })
    .context("failed to initialize logging")?;

    let metrics_handle =
        board_hub::metrics::install_recorder().context("failed to install metrics recorder")?;

    let config = HubConfig::from(&settings);
    tracing::info!(
        mailbox_capacity = config.mailbox_capacity,
        heartbeat_interval_secs = config.heartbeat_interval.as_secs(),
        heartbeat_timeout_secs = config.heartbeat_timeout.as_secs(),
        max_message_bytes = config.max_message_bytes,
        "starting chat hub"
    );

    let server = HubServer::new(config).with_metrics(metrics_handle);
    let handle = server.listen().await.context("failed to bind server")?;
    tracing::info!("board listening on http://{}", handle.addr());

    wait_for_signal().await?;

    tracing::info!("shutting down...");
    let clean = server
        .shutdown()
        .drain(vec![handle.into_task()], None)
        .await;
    if !clean {
        tracing::warn!("server did not stop within the shutdown timeout");
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    Ok(())
}
