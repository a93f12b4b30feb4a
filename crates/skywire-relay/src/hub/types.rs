//! Observer channel types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{trace, warn};

use skywire_core::config::{DisconnectPolicy, RelayConfig};
use skywire_core::line::Record;

use crate::supervisor::Lifecycle;

/// Configuration for the broadcast hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Event buffer per observer.
    pub broadcast_capacity: usize,
    /// Monitor → hub record queue depth.
    pub record_buffer: usize,
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            record_buffer: 256,
            disconnect_policy: DisconnectPolicy::default(),
        }
    }
}

impl From<&RelayConfig> for HubConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            broadcast_capacity: config.broadcast_capacity.max(1),
            record_buffer: config.record_buffer.max(1),
            disconnect_policy: config.disconnect_policy,
        }
    }
}

/// Events pushed to observers, framed as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionAck { status: String },
    ConnectionEstablished,
    ConnectionFailed { message: String },
    OutputData { result: Record },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionAck { .. } => "connection_ack",
            Self::ConnectionEstablished => "connection_established",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::OutputData { .. } => "output_data",
        }
    }
}

/// Lifecycle commands accepted from observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    StartConnection,
    StopConnection,
    StartMonitoring,
    StopMonitoring,
    ResetData,
}

impl FromStr for ClientCommand {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_connection" => Ok(Self::StartConnection),
            "stop_connection" => Ok(Self::StopConnection),
            "start_monitoring" => Ok(Self::StartMonitoring),
            "stop_monitoring" => Ok(Self::StopMonitoring),
            "reset_data" => Ok(Self::ResetData),
            other => Err(HubError::UnknownEvent {
                event: other.to_string(),
            }),
        }
    }
}

/// Inbound frame. The payload is accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ClientFrame {
    /// Parse a text frame into a command.
    pub fn parse(text: &str) -> Result<ClientCommand, HubError> {
        let frame: Self =
            serde_json::from_str(text).map_err(|e| HubError::MalformedFrame(e.to_string()))?;
        frame.event.parse()
    }
}

/// A broadcast event plus the producer lifetime it came from, if any.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) generation: Option<u64>,
    pub(crate) event: ServerEvent,
}

/// One connected observer. Yields the connection ack first, then broadcast
/// events.
///
/// Records are checked against the lifecycle again on the way out, so none
/// from a stopped or replaced producer is handed over once the supervisor
/// has moved on.
#[derive(Debug)]
pub struct ObserverSession {
    pub(crate) id: String,
    pub(crate) ack: Option<ServerEvent>,
    pub(crate) events: broadcast::Receiver<Delivery>,
    pub(crate) lifecycle_rx: watch::Receiver<Lifecycle>,
}

impl ObserverSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event for this observer; `None` once the hub is gone.
    ///
    /// A slow observer skips what it missed (best-effort delivery).
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        if let Some(ack) = self.ack.take() {
            return Some(ack);
        }
        loop {
            match self.events.recv().await {
                Ok(delivery) => {
                    if let Some(event) = self.admit(delivery) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(observer_id = %self.id, skipped, "Observer lagging, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Self::next_event`].
    pub fn try_next_event(&mut self) -> Option<ServerEvent> {
        if let Some(ack) = self.ack.take() {
            return Some(ack);
        }
        loop {
            match self.events.try_recv() {
                Ok(delivery) => {
                    if let Some(event) = self.admit(delivery) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(observer_id = %self.id, skipped, "Observer lagging, events skipped");
                }
                Err(_) => return None,
            }
        }
    }

    fn admit(&self, delivery: Delivery) -> Option<ServerEvent> {
        let Delivery { generation, event } = delivery;
        if generation.is_none_or(|g| self.lifecycle_rx.borrow().accepts_records(g)) {
            Some(event)
        } else {
            trace!(observer_id = %self.id, ?generation, "Dropped record from stale producer");
            None
        }
    }
}

/// Hub errors.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown event: {event}")]
    UnknownEvent { event: String },
}
