//! Broadcast hub for multi-observer record fan-out.
//!
//! Every observer receives every record from the current producer lifetime
//! plus lifecycle notifications. Commands from any observer drive the shared
//! supervisor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use skywire_core::config::DisconnectPolicy;

use crate::supervisor::{
    MonitorEvent, ProcessSupervisor, ProducerState, RecordEnvelope, SupervisorConfig,
    SupervisorError,
};

use super::types::{ClientCommand, Delivery, HubConfig, ObserverSession, ServerEvent};

/// Sent to observers when the producer dies without being asked to.
const PRODUCER_EXITED_MESSAGE: &str = "Data process exited unexpectedly";

struct ObserverState {
    connected_at: Instant,
}

/// Broadcast hub: observer set, record fan-out and command dispatch.
pub struct BroadcastHub {
    supervisor: Arc<ProcessSupervisor>,
    observers: RwLock<HashMap<String, ObserverState>>,
    event_tx: broadcast::Sender<Delivery>,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub around an existing supervisor.
    pub fn new(supervisor: Arc<ProcessSupervisor>, config: HubConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            supervisor,
            observers: RwLock::new(HashMap::new()),
            event_tx,
            config,
        }
    }

    /// Build supervisor and hub together and start the monitor-event forwarder.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn launch(
        supervisor_config: SupervisorConfig,
        config: HubConfig,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (monitor_tx, monitor_rx) = mpsc::channel(config.record_buffer);
        let supervisor = Arc::new(ProcessSupervisor::new(supervisor_config, monitor_tx));
        let hub = Arc::new(Self::new(supervisor, config));
        let forwarder = hub.spawn_monitor_forwarder(monitor_rx);
        (hub, forwarder)
    }

    pub const fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Register a new observer. Its first event is the connection ack.
    pub async fn connect(&self) -> ObserverSession {
        let id = uuid::Uuid::new_v4().to_string();
        let events = self.event_tx.subscribe();
        self.observers.write().await.insert(
            id.clone(),
            ObserverState {
                connected_at: Instant::now(),
            },
        );
        info!(observer_id = %id, "Observer connected");

        ObserverSession {
            id,
            ack: Some(ServerEvent::ConnectionAck {
                status: "connected".to_string(),
            }),
            events,
            lifecycle_rx: self.supervisor.subscribe(),
        }
    }

    /// Drop an observer and apply the disconnect policy.
    pub async fn disconnect(&self, session: ObserverSession) {
        let remaining = {
            let mut observers = self.observers.write().await;
            if let Some(state) = observers.remove(&session.id) {
                info!(
                    observer_id = %session.id,
                    connected_secs = state.connected_at.elapsed().as_secs(),
                    "Observer disconnected"
                );
            }
            observers.len()
        };
        drop(session);

        let stop = match self.config.disconnect_policy {
            DisconnectPolicy::Always => true,
            DisconnectPolicy::LastObserver => remaining == 0,
        };
        if stop {
            let outcome = self.supervisor.stop().await;
            debug!(remaining, ?outcome, "Producer stopped after disconnect");
        } else {
            debug!(remaining, "Producer kept for remaining observers");
        }
    }

    /// Execute an observer command against the supervisor and notify
    /// observers of the outcome.
    pub async fn handle_command(&self, observer_id: &str, command: ClientCommand) {
        info!(observer_id, ?command, "Observer command");
        match command {
            ClientCommand::StartConnection => {
                let result = self.supervisor.start().await;
                self.notify_lifecycle(result, "Failed to start data process");
            }
            ClientCommand::StopConnection => {
                let outcome = self.supervisor.stop().await;
                debug!(observer_id, ?outcome, "Connection stopped");
            }
            ClientCommand::StartMonitoring => {
                if !self.supervisor.resume() {
                    debug!(observer_id, "Monitoring not started, no producer running");
                }
            }
            ClientCommand::StopMonitoring => {
                self.supervisor.pause();
            }
            ClientCommand::ResetData => {
                let result = self.supervisor.reset().await;
                self.notify_lifecycle(result, "Failed to reset data process");
            }
        }
    }

    fn notify_lifecycle<T>(&self, result: Result<T, SupervisorError>, context: &str) {
        let event = match result {
            Ok(_)
            | Err(SupervisorError::InvalidState {
                state: ProducerState::Running,
            }) => ServerEvent::ConnectionEstablished,
            Err(e) => {
                warn!(error = %e, "{context}");
                ServerEvent::ConnectionFailed {
                    message: format!("{context}: {e}"),
                }
            }
        };
        self.broadcast(event);
    }

    /// Push an event to every connected observer.
    pub fn broadcast(&self, event: ServerEvent) {
        send_delivery(
            &self.event_tx,
            Delivery {
                generation: None,
                event,
            },
        );
    }

    /// Forward monitor output to observers.
    ///
    /// Records whose producer lifetime has ended are dropped; an unexpected
    /// producer exit becomes one `connection_failed`.
    pub fn spawn_monitor_forwarder(
        &self,
        mut monitor_rx: mpsc::Receiver<MonitorEvent>,
    ) -> JoinHandle<()> {
        let supervisor = Arc::clone(&self.supervisor);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = monitor_rx.recv().await {
                let delivery = match event {
                    MonitorEvent::Record(RecordEnvelope { generation, record }) => {
                        if !supervisor.accepts_records(generation) {
                            trace!(generation, "Dropped record from stale producer");
                            continue;
                        }
                        Delivery {
                            generation: Some(generation),
                            event: ServerEvent::OutputData { result: record },
                        }
                    }
                    MonitorEvent::ProducerExited { generation } => {
                        warn!(generation, "Notifying observers of producer exit");
                        Delivery {
                            generation: None,
                            event: ServerEvent::ConnectionFailed {
                                message: PRODUCER_EXITED_MESSAGE.to_string(),
                            },
                        }
                    }
                };
                send_delivery(&event_tx, delivery);
            }
            debug!("Monitor forwarder finished");
        })
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}

fn send_delivery(event_tx: &broadcast::Sender<Delivery>, delivery: Delivery) {
    let name = delivery.event.name();
    match event_tx.send(delivery) {
        Ok(count) => trace!(event = name, receivers = count, "Event broadcast"),
        Err(_) => trace!(event = name, "No receivers for broadcast"),
    }
}
