//! Skywire relay
//!
//! Supervises the telemetry producer (simulator or live bridge) and serves
//! decoded records to browser observers over WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use skywire_core::config::{Config, load_config};
use skywire_relay::hub::{BroadcastHub, HubConfig};
use skywire_relay::server::{AppState, build_router};
use skywire_relay::supervisor::SupervisorConfig;

#[derive(Parser, Debug)]
#[command(name = "skywire-relay")]
#[command(version, about = "Skywire relay - drone telemetry fan-out server")]
struct Args {
    /// Explicit configuration file (JSON), merged over the global one
    #[arg(long, env = "SKYWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Producer to supervise
    #[arg(long, value_parser = ["simulator", "live"])]
    producer_mode: Option<String>,

    /// What an observer disconnect does to the producer
    #[arg(long, value_parser = ["always", "last-observer"])]
    disconnect_policy: Option<String>,

    /// Log level filter for the relay (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SKYWIRE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// CLI flags win over files and environment.
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(addr) = self.addr {
            config.relay.bind_addr = addr;
        }
        if let Some(mode) = &self.producer_mode {
            config.producer.mode = mode.parse()?;
        }
        if let Some(policy) = &self.disconnect_policy {
            config.relay.disconnect_policy = policy.parse()?;
        }
        if let Some(level) = &self.log_level {
            config.relay.log_level.clone_from(level);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config)?;

    let log_filter = format!("skywire_relay={}", config.relay.log_level);
    skywire_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.relay.bind_addr,
        mode = ?config.producer.mode,
        disconnect_policy = %config.relay.disconnect_policy,
        "Starting skywire-relay"
    );

    let (hub, forwarder) = BroadcastHub::launch(
        SupervisorConfig::from(&config.producer),
        HubConfig::from(&config.relay),
    );
    let app = build_router(
        AppState {
            hub: std::sync::Arc::clone(&hub),
        },
        &config.relay.allowed_origins,
    );
    let listener = tokio::net::TcpListener::bind(config.relay.bind_addr).await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(addr = %config.relay.bind_addr, "Relay ready");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    hub.supervisor().shutdown().await;
    forwarder.abort();

    info!("Relay stopped");
    Ok(())
}
