//! Error types for the Skywire core library.

use thiserror::Error;

/// Result type alias using Skywire `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Skywire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
