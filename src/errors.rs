//! Error taxonomy for the log buffer
//!
//! Codec and transport failures have their own types because they are
//! recovered locally (skip the slot, retry next tick). Everything else flows
//! through [`LogBufError`]. Programming errors such as a second
//! registration or purging past the live count are not represented here:
//! they panic.

use thiserror::Error;

/// Failure to turn a stored slot back into an event, or an event into text
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Event encoding failed")]
    Encode(#[source] serde_json::Error),

    #[error("Malformed event record")]
    Decode(#[source] serde_json::Error),

    #[error("Unknown severity value: {0}")]
    UnknownSeverity(u8),
}

/// Failure to deliver a batch to the collector
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Collector at {url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Transport unavailable: {message}")]
    Unavailable { message: String },
}

/// Main error type for the log buffer
#[derive(Error, Debug)]
pub enum LogBufError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage operation failed: {operation} - {source}")]
    Storage {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Persisted buffer state is corrupt: {key} = {value:?}")]
    CorruptState { key: String, value: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for Result with LogBufError
pub type LogBufResult<T> = Result<T, LogBufError>;

impl LogBufError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Create a corrupt-state error for a persisted key
    pub fn corrupt_state(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::CorruptState {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

impl From<sled::Error> for LogBufError {
    fn from(err: sled::Error) -> Self {
        LogBufError::storage("sled_operation", err)
    }
}

impl From<std::io::Error> for LogBufError {
    fn from(err: std::io::Error) -> Self {
        LogBufError::io("io_operation", err)
    }
}

impl From<figment::Error> for LogBufError {
    fn from(err: figment::Error) -> Self {
        LogBufError::config(err.to_string())
    }
}
