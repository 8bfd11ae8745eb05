//! Error type shared by the tune-manager crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that cross crate boundaries
///
/// The importer's HTTP layer maps `NotFound` and `InvalidInput` to client
/// errors; the rest end up as stage faults or startup failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Event payload could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file unreadable or holding an unusable value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Track or artwork identifier not in the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request missing a required field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Registry bookkeeping out of step, e.g. completing a stage never started
    #[error("Internal error: {0}")]
    Internal(String),
}
