//! Common error types for the fable playback core
//!
//! Defines the playback error taxonomy using thiserror for clear error
//! propagation. Resolution failures surface to the operation that initiated
//! them; engine-load and persistence failures are caught and logged at the
//! player boundary and never escalate past it.

use thiserror::Error;

/// Common result type for fable operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the playback subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// URL resolution failed (network error or backend-reported)
    #[error("URL resolution failed: {0}")]
    Resolution(String),

    /// Snapshot read or write failed (corrupt JSON, storage unavailable)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
