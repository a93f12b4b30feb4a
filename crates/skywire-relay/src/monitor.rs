//! Line monitor: producer stdout → decoded records.
//!
//! One monitor task runs per producer lifetime. It owns the child's stdout
//! and stderr, so both streams close exactly once, when the task ends.
//!
//! Data flow:
//! ```text
//! child stdout → read_until('\n') → line::decode → (generation, Record) → hub
//! child stderr → log
//! ```
//!
//! If stdout closes while its generation is still running, the producer died
//! on its own: the monitor moves the lifecycle to `Failed` and tells the hub.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use skywire_core::line;

use crate::supervisor::{Lifecycle, MonitorEvent, ProducerState, RecordEnvelope};

/// Everything a monitor needs for one producer lifetime.
pub struct MonitorContext<O = ChildStdout, E = ChildStderr> {
    pub generation: u64,
    pub stdout: O,
    pub stderr: E,
    /// Shared with the supervisor; the monitor only writes to it to mark its
    /// own generation `Failed`.
    pub lifecycle_tx: Arc<watch::Sender<Lifecycle>>,
    pub forwarding: Arc<AtomicBool>,
    pub event_tx: mpsc::Sender<MonitorEvent>,
    pub read_retry_delay: Duration,
}

/// Counters reported when a monitor exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    /// Non-empty lines read from stdout.
    pub lines: u64,
    /// Records handed to the hub.
    pub forwarded: u64,
    /// Lines that did not decode.
    pub dropped: u64,
    /// Records decoded while forwarding was paused.
    pub paused: u64,
    pub read_errors: u64,
    /// Stdout closed while this generation was still running.
    pub producer_exited: bool,
}

/// Spawn the monitor task for one producer lifetime.
pub fn spawn_line_monitor<O, E>(ctx: MonitorContext<O, E>) -> JoinHandle<MonitorStats>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(run_line_monitor(ctx))
}

/// Run until stdout closes or the lifecycle leaves `Running` for this
/// generation.
pub async fn run_line_monitor<O, E>(ctx: MonitorContext<O, E>) -> MonitorStats
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let MonitorContext {
        generation,
        stdout,
        stderr,
        lifecycle_tx,
        forwarding,
        event_tx,
        read_retry_delay,
    } = ctx;

    let mut lifecycle_rx = lifecycle_tx.subscribe();
    let mut stdout = BufReader::new(stdout);
    let mut stderr = Some(BufReader::new(stderr));
    // Kept across iterations: a cancelled read may leave a partial line here.
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut stats = MonitorStats::default();
    let mut eof = false;

    debug!(generation, "Line monitor started");

    loop {
        if !lifecycle_rx.borrow_and_update().is_live(generation) {
            debug!(generation, "Producer left running state");
            break;
        }

        tokio::select! {
            read = stdout.read_until(b'\n', &mut out_buf) => match read {
                Ok(0) => {
                    info!(generation, "Producer stdout closed");
                    eof = true;
                    break;
                }
                Ok(_) => {
                    let raw = String::from_utf8_lossy(&out_buf).into_owned();
                    out_buf.clear();
                    let step = forward_line(
                        &raw,
                        generation,
                        &lifecycle_rx,
                        &forwarding,
                        &event_tx,
                        &mut stats,
                    )
                    .await;
                    if step.is_break() {
                        break;
                    }
                }
                Err(e) => {
                    stats.read_errors += 1;
                    warn!(generation, error = %e, "Error reading producer output");
                    tokio::select! {
                        () = tokio::time::sleep(read_retry_delay) => {}
                        _ = lifecycle_rx.changed() => {}
                    }
                }
            },
            read = read_optional_line(stderr.as_mut(), &mut err_buf) => match read {
                Ok(0) => {
                    debug!(generation, "Producer stderr closed");
                    stderr = None;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&err_buf);
                    let text = text.trim();
                    if !text.is_empty() {
                        warn!(generation, "stderr: {}", text);
                    }
                    err_buf.clear();
                }
                Err(e) => {
                    debug!(generation, error = %e, "Error reading producer stderr, closing it");
                    stderr = None;
                }
            },
            changed = lifecycle_rx.changed() => {
                if changed.is_err() {
                    debug!(generation, "Supervisor gone");
                    break;
                }
            }
        }
    }

    drop(stdout);
    drop(stderr);

    if eof && mark_exited(&lifecycle_tx, generation) {
        forwarding.store(false, Ordering::Release);
        stats.producer_exited = true;
        warn!(generation, "Producer exited unexpectedly");
        if event_tx
            .send(MonitorEvent::ProducerExited { generation })
            .await
            .is_err()
        {
            debug!(generation, "Event channel closed before exit report");
        }
    }

    info!(generation, ?stats, "Line monitor finished");
    stats
}

/// Move a still-running `generation` to `Failed`. Returns `false` when a
/// lifecycle operation got there first.
fn mark_exited(lifecycle_tx: &watch::Sender<Lifecycle>, generation: u64) -> bool {
    lifecycle_tx.send_if_modified(|lifecycle| {
        if !lifecycle.is_live(generation) {
            return false;
        }
        lifecycle.state = ProducerState::Failed;
        lifecycle.pid = None;
        true
    })
}

async fn forward_line(
    raw: &str,
    generation: u64,
    lifecycle_rx: &watch::Receiver<Lifecycle>,
    forwarding: &AtomicBool,
    event_tx: &mpsc::Sender<MonitorEvent>,
    stats: &mut MonitorStats,
) -> ControlFlow<()> {
    let line = raw.trim();
    if line.is_empty() {
        return ControlFlow::Continue(());
    }
    stats.lines += 1;
    trace!(generation, line, "Producer line");

    let Some(record) = line::decode(line) else {
        stats.dropped += 1;
        debug!(generation, line, "Dropped undecodable line");
        return ControlFlow::Continue(());
    };

    if !forwarding.load(Ordering::Acquire) {
        stats.paused += 1;
        return ControlFlow::Continue(());
    }

    if !lifecycle_rx.borrow().is_live(generation) {
        return ControlFlow::Break(());
    }

    let envelope = RecordEnvelope { generation, record };
    if event_tx.send(MonitorEvent::Record(envelope)).await.is_err() {
        warn!(generation, "Record channel closed");
        return ControlFlow::Break(());
    }
    stats.forwarded += 1;
    ControlFlow::Continue(())
}

/// Read a line from an optional reader; pends forever once the reader is gone.
async fn read_optional_line<R>(reader: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}
