//! Skywire Core Library
//!
//! Shared functionality for Skywire components:
//! - Telemetry line protocol (decode producer output, encode flight messages)
//! - Configuration resolution and hierarchy
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod line;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
