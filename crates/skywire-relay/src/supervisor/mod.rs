//! Producer subprocess supervision.

mod manager;
mod producer;
mod types;

pub use manager::ProcessSupervisor;
pub use producer::{install_dir, resolve_program};
pub use types::{
    Lifecycle, MonitorEvent, ProducerCommand, ProducerInfo, ProducerState, RecordEnvelope,
    StopOutcome, SupervisorConfig, SupervisorError, SupervisorSnapshot,
};
