//! Skywire relay: supervises one telemetry producer process and fans its
//! decoded records out to every connected observer.

pub mod hub;
pub mod monitor;
pub mod server;
pub mod supervisor;
