//! Synthetic telemetry producer speaking the relay's line protocol.

pub mod simulator;
