//! Observer fan-out and command dispatch.

#[allow(clippy::module_inception)]
mod hub;
mod types;

pub use hub::BroadcastHub;
pub use types::{ClientCommand, ClientFrame, HubConfig, HubError, ObserverSession, ServerEvent};
