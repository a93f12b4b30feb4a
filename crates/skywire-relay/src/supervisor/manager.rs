//! Producer subprocess lifecycle manager.
//!
//! Owns the single producer child, its lifecycle state and the line monitor
//! bound to it. Lifecycle operations are serialized by one async lock; the
//! state is published through a `watch` channel so monitors and the hub can
//! read it without taking that lock.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::monitor::{MonitorContext, MonitorStats, spawn_line_monitor};

use super::producer::{install_dir, resolve_program};
use super::types::{
    Lifecycle, MonitorEvent, ProducerInfo, ProducerState, StopOutcome, SupervisorConfig,
    SupervisorError, SupervisorSnapshot,
};

/// How long to wait for a dead producer's stderr when reporting a start failure.
const STDERR_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor for the producer process.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    inner: Mutex<Inner>,
    lifecycle_tx: Arc<watch::Sender<Lifecycle>>,
    forwarding: Arc<AtomicBool>,
    event_tx: mpsc::Sender<MonitorEvent>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    running: Option<RunningProducer>,
}

struct RunningProducer {
    child: Child,
    generation: u64,
    monitor: JoinHandle<MonitorStats>,
}

impl ProcessSupervisor {
    /// Create an idle supervisor. Monitor output is sent on `event_tx`.
    pub fn new(config: SupervisorConfig, event_tx: mpsc::Sender<MonitorEvent>) -> Self {
        let (lifecycle_tx, _) = watch::channel(Lifecycle::default());
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            lifecycle_tx: Arc::new(lifecycle_tx),
            forwarding: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    /// Current lifecycle.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle_tx.borrow()
    }

    /// Current producer state.
    pub fn state(&self) -> ProducerState {
        self.lifecycle().state
    }

    /// Whether the producer of `generation` is the one currently running.
    pub fn is_live(&self, generation: u64) -> bool {
        self.lifecycle_tx.borrow().is_live(generation)
    }

    /// Whether records tagged with `generation` may still be delivered.
    pub fn accepts_records(&self, generation: u64) -> bool {
        self.lifecycle_tx.borrow().accepts_records(generation)
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle_tx.subscribe()
    }

    /// Whether the monitor currently forwards records.
    pub fn is_forwarding(&self) -> bool {
        self.forwarding.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        let lifecycle = self.lifecycle();
        SupervisorSnapshot {
            state: lifecycle.state,
            generation: lifecycle.generation,
            pid: lifecycle.pid,
            forwarding: self.is_forwarding(),
        }
    }

    /// Start the producer. Valid from `Idle` or `Failed`.
    pub async fn start(&self) -> Result<ProducerInfo, SupervisorError> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner).await
    }

    /// Stop the producer. Idempotent; always ends `Idle` with the child and
    /// its streams released.
    pub async fn stop(&self) -> StopOutcome {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    /// Stop then start, without letting another lifecycle operation in between.
    pub async fn reset(&self) -> Result<ProducerInfo, SupervisorError> {
        let mut inner = self.inner.lock().await;
        let outcome = self.stop_locked(&mut inner).await;
        debug!(?outcome, "Reset: previous producer stopped");
        self.start_locked(&mut inner).await
    }

    /// Pause forwarding without touching the process. Returns `false` when
    /// no producer is running.
    pub fn pause(&self) -> bool {
        self.set_forwarding(false)
    }

    /// Resume forwarding. Returns `false` when no producer is running.
    pub fn resume(&self) -> bool {
        self.set_forwarding(true)
    }

    /// Stop the producer for relay shutdown.
    pub async fn shutdown(&self) {
        let outcome = self.stop().await;
        info!(?outcome, "Supervisor shut down");
    }

    fn set_forwarding(&self, enabled: bool) -> bool {
        if self.state() != ProducerState::Running {
            debug!(enabled, "Forwarding toggle ignored, producer not running");
            return false;
        }
        let previous = self.forwarding.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(enabled, "Record forwarding toggled");
        }
        true
    }

    fn publish(&self, generation: u64, state: ProducerState, pid: Option<u32>) {
        self.lifecycle_tx.send_replace(Lifecycle {
            generation,
            state,
            pid,
        });
    }

    async fn start_locked(&self, inner: &mut Inner) -> Result<ProducerInfo, SupervisorError> {
        self.reap_if_exited(inner).await;

        let current = self.lifecycle();
        if !matches!(current.state, ProducerState::Idle | ProducerState::Failed) {
            return Err(SupervisorError::InvalidState {
                state: current.state,
            });
        }

        inner.generation += 1;
        let generation = inner.generation;
        self.publish(generation, ProducerState::Starting, None);

        match self.spawn_checked().await {
            Ok(mut child) => {
                let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take())
                else {
                    child.kill().await.ok();
                    self.publish(generation, ProducerState::Failed, None);
                    return Err(SupervisorError::SpawnFailed {
                        reason: "Failed to capture producer output".to_string(),
                    });
                };

                let pid = child.id();
                self.forwarding.store(true, Ordering::Release);
                self.publish(generation, ProducerState::Running, pid);

                let monitor = spawn_line_monitor(MonitorContext {
                    generation,
                    stdout,
                    stderr,
                    lifecycle_tx: Arc::clone(&self.lifecycle_tx),
                    forwarding: Arc::clone(&self.forwarding),
                    event_tx: self.event_tx.clone(),
                    read_retry_delay: self.config.read_retry_delay,
                });

                inner.running = Some(RunningProducer {
                    child,
                    generation,
                    monitor,
                });

                info!(generation, pid, "Producer running");
                Ok(ProducerInfo { generation, pid })
            }
            Err(e) => {
                warn!(generation, error = %e, "Producer failed to start");
                self.publish(generation, ProducerState::Failed, None);
                Err(e)
            }
        }
    }

    /// Spawn the producer and make sure it survives the startup grace period.
    async fn spawn_checked(&self) -> Result<Child, SupervisorError> {
        let command = &self.config.command;
        let install_dir = install_dir();
        let program = resolve_program(&command.program, install_dir.as_deref())?;

        info!(program = %program.display(), args = ?command.args, "Spawning producer");
        let mut child = Command::new(&program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed {
                reason: format!("{}: {e}", program.display()),
            })?;

        tokio::time::sleep(self.config.startup_grace).await;

        match child.try_wait() {
            Ok(None) => Ok(child),
            Ok(Some(status)) => {
                let stderr = read_stderr(&mut child).await;
                Err(SupervisorError::ExitedEarly {
                    status: status.to_string(),
                    stderr,
                })
            }
            Err(e) => {
                child.kill().await.ok();
                Err(SupervisorError::SpawnFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn stop_locked(&self, inner: &mut Inner) -> StopOutcome {
        let Some(running) = inner.running.take() else {
            let current = self.lifecycle();
            if current.state != ProducerState::Idle {
                self.publish(current.generation, ProducerState::Idle, None);
            }
            debug!("Stop requested with no producer running");
            return StopOutcome::AlreadyIdle;
        };

        let RunningProducer {
            mut child,
            generation,
            monitor,
        } = running;

        self.forwarding.store(false, Ordering::Release);
        self.publish(generation, ProducerState::Stopping, child.id());
        info!(generation, pid = ?child.id(), "Stopping producer");

        let outcome = self.terminate(&mut child, generation).await;

        // Release unconditionally: child handle first, then the monitor that
        // owns the output streams.
        drop(child);
        self.join_monitor(monitor, generation).await;
        self.publish(generation, ProducerState::Idle, None);

        info!(generation, ?outcome, "Producer cleanup complete");
        outcome
    }

    /// Graceful termination with a bounded wait, escalating to a kill.
    async fn terminate(&self, child: &mut Child, generation: u64) -> StopOutcome {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: pid is a valid process ID obtained from our own Child handle.
                // kill(2) with SIGTERM is safe to call on any owned subprocess.
                #[allow(unsafe_code)]
                #[allow(clippy::cast_possible_wrap)]
                let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                if ret != 0 {
                    let err = std::io::Error::last_os_error();
                    warn!(generation, pid, error = %err, "Failed to send SIGTERM");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = child.start_kill() {
                warn!(generation, error = %e, "Failed to request producer exit");
            }
        }

        match tokio::time::timeout(self.config.terminate_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(generation, ?status, "Producer exited gracefully");
                StopOutcome::Graceful
            }
            Ok(Err(e)) => {
                warn!(generation, error = %e, "Error waiting for producer, killing");
                force_kill(child, generation).await
            }
            Err(_) => {
                warn!(generation, "Timeout waiting for graceful shutdown, killing");
                force_kill(child, generation).await
            }
        }
    }

    async fn join_monitor(&self, mut monitor: JoinHandle<MonitorStats>, generation: u64) {
        match tokio::time::timeout(self.config.terminate_timeout, &mut monitor).await {
            Ok(Ok(stats)) => debug!(generation, ?stats, "Line monitor joined"),
            Ok(Err(e)) => warn!(generation, error = %e, "Line monitor task failed"),
            Err(_) => {
                warn!(generation, "Line monitor did not exit, aborting");
                monitor.abort();
                let _ = monitor.await;
            }
        }
    }

    /// A producer that died on its own still occupies the slot; clear it so
    /// `start()` can proceed. Its monitor has usually marked it `Failed`
    /// already, but the process may also be gone while a grandchild keeps
    /// stdout open.
    async fn reap_if_exited(&self, inner: &mut Inner) {
        let failed = self.state() == ProducerState::Failed;
        let exited = match inner.running.as_mut() {
            Some(running) => failed || matches!(running.child.try_wait(), Ok(Some(_))),
            None => false,
        };
        if exited {
            warn!(generation = inner.generation, "Producer exited on its own, reaping");
            self.stop_locked(inner).await;
        }
    }
}

async fn force_kill(child: &mut Child, generation: u64) -> StopOutcome {
    match child.kill().await {
        Ok(()) => {
            info!(generation, "Producer killed");
            StopOutcome::Killed
        }
        Err(e) => {
            error!(generation, error = %e, "Failed to kill producer");
            StopOutcome::KillFailed
        }
    }
}

/// Collect whatever a dead producer wrote to stderr.
async fn read_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::new();
    };
    let mut buf = Vec::new();
    match tokio::time::timeout(STDERR_READ_TIMEOUT, stderr.read_to_end(&mut buf)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to read producer stderr"),
        Err(_) => debug!("Timed out reading producer stderr"),
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::supervisor::ProducerCommand;

    fn supervisor(program: &str) -> ProcessSupervisor {
        let (tx, _rx) = mpsc::channel(8);
        ProcessSupervisor::new(SupervisorConfig::new(ProducerCommand::new(program)), tx)
    }

    #[tokio::test]
    async fn new_supervisor_is_idle() {
        let sup = supervisor("skywire-sim");
        assert_eq!(sup.state(), ProducerState::Idle);
        assert_eq!(sup.lifecycle().generation, 0);
        assert!(!sup.is_forwarding());
    }

    #[tokio::test]
    async fn stop_twice_without_start_is_noop() {
        let sup = supervisor("skywire-sim");
        assert_eq!(sup.stop().await, StopOutcome::AlreadyIdle);
        assert_eq!(sup.stop().await, StopOutcome::AlreadyIdle);
        assert_eq!(sup.state(), ProducerState::Idle);
        assert_eq!(sup.lifecycle().generation, 0);
    }

    #[tokio::test]
    async fn missing_program_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-producer");
        let sup = supervisor(missing.to_str().unwrap());

        let result = sup.start().await;
        assert!(matches!(result, Err(SupervisorError::ProducerNotFound { .. })));
        assert_eq!(sup.state(), ProducerState::Failed);
    }

    #[tokio::test]
    async fn pause_without_producer_is_rejected() {
        let sup = supervisor("skywire-sim");
        assert!(!sup.pause());
        assert!(!sup.resume());
        assert!(!sup.is_forwarding());
    }
}
