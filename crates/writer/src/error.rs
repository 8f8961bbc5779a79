//! Error types for the batching writer
//!
//! `WriterError` is `Clone` because a sink failure is latched once by the
//! flush loop and then handed to every later caller.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type for writer operations
pub type Result<T> = std::result::Result<T, WriterError>;

/// Errors returned by [`BatchWriter`](crate::BatchWriter) operations
#[derive(Debug, Clone, Error)]
pub enum WriterError {
    /// The writer reached its terminal state
    #[error("writer was closed")]
    Closed,

    /// The pending queue is full and the writer does not block
    #[error("writer queue full ({capacity} writes in flight)")]
    Backpressure {
        /// Capacity of the pending queue
        capacity: usize,
    },

    /// The sink returned an error during a flush
    #[error("sink write failed: {0}")]
    Sink(Arc<io::Error>),

    /// A flush did not complete within the configured write timeout
    #[error("sink write timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration or construction
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WriterError {
    /// Wrap an I/O error from the sink
    pub fn sink(err: io::Error) -> Self {
        Self::Sink(Arc::new(err))
    }

    /// True for errors that came from the sink (write failure or timeout)
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, Self::Sink(_) | Self::Timeout(_))
    }

    /// True if the producer may retry the same payload later
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::Backpressure { .. })
    }
}

impl From<io::Error> for WriterError {
    fn from(err: io::Error) -> Self {
        Self::sink(err)
    }
}

/// Errors raised while loading or validating writer configuration
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Failed to parse TOML
    #[error("failed to parse writer config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the writer cannot run with
    #[error("writer config has invalid {field}: {message}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// `spawn()` was called on a writer configured for manual driving
    #[error("write mode is manual; use build() and drive the flush loop yourself")]
    ManualModeSpawn,

    /// No tokio runtime is available to spawn the flush loop on
    #[error("no tokio runtime available to spawn the flush loop")]
    NoRuntime,
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
