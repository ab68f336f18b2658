// surge-core/src/error.rs
// Error handling for the stress-test orchestrator

use std::result;
use thiserror::Error;

/// Main error type for the Surge harness
#[derive(Error, Debug)]
pub enum SurgeError {
    /// Configuration validation errors
    #[error("Configuration error: {field} - {message}")]
    Config { field: String, message: String },

    /// A worker terminated abnormally (panic, non-zero exit, garbage output)
    #[error("Worker {worker} failed: {reason}")]
    WorkerFailure { worker: usize, reason: String },

    /// A worker pool returned results that don't match the dispatch
    #[error("Invalid worker results: {0}")]
    InvalidResult(String),

    /// I/O errors (spawning workers, writing results)
    #[error("I/O error: {operation} failed - {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context} - {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for convenience
pub type Result<T> = result::Result<T, SurgeError>;

/// How far an error is allowed to travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Absorbed by the round scheduler into a degraded record
    RoundLocal,
    /// Stops the whole run
    Fatal,
}

impl SurgeError {
    pub fn config(field: &str, message: impl Into<String>) -> Self {
        SurgeError::Config {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn worker(worker: usize, reason: impl Into<String>) -> Self {
        SurgeError::WorkerFailure {
            worker,
            reason: reason.into(),
        }
    }

    pub fn io(operation: &str, source: std::io::Error) -> Self {
        SurgeError::Io {
            operation: operation.to_string(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SurgeError::WorkerFailure { .. } | SurgeError::InvalidResult(_) => {
                ErrorCategory::RoundLocal
            }
            _ => ErrorCategory::Fatal,
        }
    }

    pub fn is_round_local(&self) -> bool {
        self.category() == ErrorCategory::RoundLocal
    }
}

impl From<serde_json::Error> for SurgeError {
    fn from(err: serde_json::Error) -> Self {
        SurgeError::Serialization {
            context: "JSON processing".to_string(),
            source: err,
        }
    }
}
