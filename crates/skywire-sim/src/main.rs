//! Skywire simulator
//!
//! Writes synthetic telemetry batches to stdout until stopped, the pipe
//! closes, or `--count` batches have been written. Logs go to stderr.

use std::io::ErrorKind;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use skywire_sim::simulator::SensorSimulator;

#[derive(Parser, Debug)]
#[command(name = "skywire-sim")]
#[command(version, about = "Skywire simulator - synthetic drone telemetry producer")]
struct Args {
    /// Milliseconds between batches
    #[arg(long, default_value_t = 200, env = "SKYWIRE_SIM_INTERVAL_MS")]
    interval_ms: u64,

    /// RNG seed for reproducible output (random when omitted)
    #[arg(long, env = "SKYWIRE_SIM_SEED")]
    seed: Option<u64>,

    /// Stop after this many batches
    #[arg(long)]
    count: Option<u64>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "SKYWIRE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SKYWIRE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("skywire_sim={}", args.log_level);
    skywire_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, interval_ms = args.interval_ms, count = ?args.count, "Starting skywire-sim");

    let mut simulator = SensorSimulator::new(seed);
    let mut stdout = tokio::io::stdout();
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));

    loop {
        if args.count.is_some_and(|count| simulator.tick() >= count) {
            info!(batches = simulator.tick(), "Batch count reached");
            break;
        }

        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        }

        let batch = simulator.next_batch();
        let written = async {
            stdout.write_all(batch.as_bytes()).await?;
            stdout.flush().await
        }
        .await;

        match written {
            Ok(()) => debug!(tick = simulator.tick(), "Batch written"),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                info!("Stdout closed, stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
