//! Error types for whatson-ingest

use thiserror::Error;

/// Failure of a single adapter call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    /// Connection, timeout or other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered with a non-success status
    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Response decoded but its content is unusable
    #[error("Invalid response: {0}")]
    Invalid(String),
}

impl AdapterError {
    /// Transient failures are retried by the guard before being counted
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Network(_) => true,
            AdapterError::Status { status } => *status == 429 || *status >= 500,
            AdapterError::Parse(_) | AdapterError::Invalid(_) => false,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AdapterError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            AdapterError::Status {
                status: status.as_u16(),
            }
        } else {
            AdapterError::Network(e.to_string())
        }
    }
}

/// A source failed more often in a row than its threshold allows.
///
/// Unrecoverable for the running batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{source_name} failed {failures} consecutive times (threshold {threshold})")]
pub struct GuardTripped {
    pub source_name: String,
    pub failures: u32,
    pub threshold: u32,
}

/// Batch-level errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Stopped on a tripped guard; rerun with `--start-index {index}` to resume
    #[error("Batch aborted at index {index} ({url}): {tripped}")]
    Aborted {
        index: usize,
        url: String,
        #[source]
        tripped: GuardTripped,
    },

    #[error("Store error: {0}")]
    Store(#[from] whatson_common::Error),

    /// Identifier file missing or malformed
    #[error("Input error: {0}")]
    Input(String),

    /// A third-party service is unavailable
    #[error("Pre-flight check failed: {0}")]
    Preflight(String),
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;
