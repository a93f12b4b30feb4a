//! Supervisor types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use skywire_core::line::Record;

/// Lifecycle of the supervised producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State plus the generation it belongs to, published to monitors and the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub generation: u64,
    pub state: ProducerState,
    /// OS process id of the child while one exists.
    pub pid: Option<u32>,
}

impl Lifecycle {
    /// Whether the producer of `generation` is the one currently running.
    pub fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.state == ProducerState::Running
    }

    /// Whether records read from `generation` may still reach observers.
    ///
    /// A producer that exited on its own leaves its generation `Failed`;
    /// whatever it wrote before exiting is still delivered.
    pub fn accepts_records(&self, generation: u64) -> bool {
        self.generation == generation
            && matches!(self.state, ProducerState::Running | ProducerState::Failed)
    }
}

/// A decoded record tagged with the producer lifetime that read it.
#[derive(Debug, Clone)]
pub struct RecordEnvelope {
    pub generation: u64,
    pub record: Record,
}

/// What a line monitor reports to the hub.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Record(RecordEnvelope),
    /// Stdout closed while the generation was still running; the lifecycle
    /// has already moved to `Failed`.
    ProducerExited { generation: u64 },
}

/// How to launch the producer.
#[derive(Debug, Clone)]
pub struct ProducerCommand {
    /// Executable; relative paths resolve against the relay's install dir.
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProducerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Configuration for the process supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: ProducerCommand,
    /// Grace period for SIGTERM before SIGKILL.
    pub terminate_timeout: Duration,
    /// How long after spawn the liveness check runs.
    pub startup_grace: Duration,
    /// Back-off after a failed stdout read.
    pub read_retry_delay: Duration,
}

impl SupervisorConfig {
    pub fn new(command: ProducerCommand) -> Self {
        Self {
            command,
            terminate_timeout: Duration::from_secs(5),
            startup_grace: Duration::from_millis(200),
            read_retry_delay: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub const fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    #[must_use]
    pub const fn with_read_retry_delay(mut self, delay: Duration) -> Self {
        self.read_retry_delay = delay;
        self
    }
}

/// Identity of one running producer lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProducerInfo {
    pub generation: u64,
    pub pid: Option<u32>,
}

/// Which termination path `stop()` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    AlreadyIdle,
    /// Exited within the grace period.
    Graceful,
    /// Force-killed after the grace period or a wait error.
    Killed,
    /// Even the kill failed; the handle was released anyway.
    KillFailed,
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorSnapshot {
    pub state: ProducerState,
    pub generation: u64,
    pub pid: Option<u32>,
    pub forwarding: bool,
}

/// Errors from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Producer executable not found: {}", path.display())]
    ProducerNotFound { path: PathBuf },

    #[error("Failed to spawn producer: {reason}")]
    SpawnFailed { reason: String },

    #[error("Producer exited during startup ({status}): {stderr}")]
    ExitedEarly { status: String, stderr: String },

    #[error("Producer already {state}")]
    InvalidState { state: ProducerState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_live_for_current_running_generation() {
        let lc = Lifecycle {
            generation: 3,
            state: ProducerState::Running,
            pid: Some(42),
        };
        assert!(lc.is_live(3));
        assert!(!lc.is_live(2));

        let stopping = Lifecycle {
            state: ProducerState::Stopping,
            ..lc
        };
        assert!(!stopping.is_live(3));
    }

    #[test]
    fn exited_generation_still_accepts_its_records() {
        let failed = Lifecycle {
            generation: 3,
            state: ProducerState::Failed,
            pid: None,
        };
        assert!(!failed.is_live(3));
        assert!(failed.accepts_records(3));
        assert!(!failed.accepts_records(2));

        let idle = Lifecycle {
            state: ProducerState::Idle,
            ..failed
        };
        assert!(!idle.accepts_records(3));
    }

    #[test]
    fn early_exit_error_carries_stderr() {
        let err = SupervisorError::ExitedEarly {
            status: "exit status: 2".into(),
            stderr: "serial port busy".into(),
        };
        assert!(err.to_string().contains("serial port busy"));
    }
}
