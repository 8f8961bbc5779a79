//! Writer configuration
//!
//! All fields have defaults, so an empty TOML document is a valid config.
//!
//! # Example
//!
//! ```toml
//! name = "access-log"
//! max_in_flight = 4096
//! max_flush_delay = "5ms"
//! write_timeout = "2s"
//! block_on_full = false
//! write_mode = "coalesce"
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Upper bound for `max_in_flight`; one queue slot holds one payload buffer
pub const MAX_IN_FLIGHT_LIMIT: usize = 1 << 20;

/// Default flush delay for coalescing writers
pub const DEFAULT_MAX_FLUSH_DELAY: Duration = Duration::from_millis(5);

/// How the flush loop hands accumulated payloads to the sink
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Concatenate payloads into one buffer, then issue a single write
    Coalesce,
    /// Pass the discrete buffers to a scatter/gather write (default)
    #[default]
    Vectored,
    /// Like `Vectored`, but the caller drives the flush loop
    Manual,
}

impl WriteMode {
    /// True if payloads are copied into one contiguous buffer before writing
    #[inline]
    pub fn coalesces(self) -> bool {
        matches!(self, Self::Coalesce)
    }

    /// Get the mode name as used in config files
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coalesce => "coalesce",
            Self::Vectored => "vectored",
            Self::Manual => "manual",
        }
    }
}

/// Configuration snapshot captured when a writer is built
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WriterConfig {
    /// Writer name used in log fields
    /// Default: "writer"
    pub name: String,

    /// Capacity of the pending queue
    /// Default: 0 (auto = 2 x available parallelism)
    pub max_in_flight: usize,

    /// Deadline applied to each sink write call
    /// Default: none
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,

    /// Longest time a payload waits in the accumulation context
    /// Default: 0 (flush as soon as the queue runs dry)
    #[serde(with = "humantime_serde")]
    pub max_flush_delay: Duration,

    /// Suspend producers when the queue is full instead of rejecting
    /// Default: false
    pub block_on_full: bool,

    /// Flush strategy
    /// Default: vectored
    pub write_mode: WriteMode,

    /// Shut the sink down once the flush loop exits
    /// Default: true
    pub shutdown_sink: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            name: "writer".into(),
            max_in_flight: 0,
            write_timeout: None,
            max_flush_delay: Duration::ZERO,
            block_on_full: false,
            write_mode: WriteMode::Vectored,
            shutdown_sink: true,
        }
    }
}

impl WriterConfig {
    /// Config for a coalescing writer flushing at most every `delay`
    pub fn coalescing(delay: Duration) -> Self {
        Self {
            write_mode: WriteMode::Coalesce,
            max_flush_delay: delay,
            ..Default::default()
        }
    }

    /// Config for an eager vectored writer
    pub fn vectored() -> Self {
        Self::default()
    }

    /// Parse a config from TOML and validate it
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values can be run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(ConfigError::invalid(
                "max_in_flight",
                format!("{} exceeds limit {MAX_IN_FLIGHT_LIMIT}", self.max_in_flight),
            ));
        }
        if self.write_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::invalid(
                "write_timeout",
                "must be greater than zero (omit it to disable)",
            ));
        }
        Ok(())
    }

    /// Queue capacity after resolving the auto default
    pub fn effective_max_in_flight(&self) -> usize {
        match self.max_in_flight {
            0 => 2 * num_cpus(),
            n => n,
        }
    }

    /// True if a zero flush delay makes every collected batch flush immediately
    #[inline]
    pub fn is_eager(&self) -> bool {
        self.max_flush_delay.is_zero()
    }

    /// Set the writer name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the pending queue capacity
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Set the per-call sink write deadline
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the maximum flush delay
    #[must_use]
    pub fn with_max_flush_delay(mut self, delay: Duration) -> Self {
        self.max_flush_delay = delay;
        self
    }

    /// Block producers when the queue is full
    #[must_use]
    pub fn block_on_full(mut self) -> Self {
        self.block_on_full = true;
        self
    }

    /// Set the flush strategy
    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Keep the sink open after the flush loop exits
    #[must_use]
    pub fn keep_sink_open(mut self) -> Self {
        self.shutdown_sink = false;
        self
    }
}

impl FromStr for WriterConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
