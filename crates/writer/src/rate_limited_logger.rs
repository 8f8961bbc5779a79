//! Rate-limited warning logging
//!
//! A non-blocking writer under sustained overload rejects every write.
//! Logging each rejection would flood the log, so rejections go through a
//! `RateLimitedLogger`: at most one line per interval, carrying the number
//! of rejections suppressed since the previous line.
//!
//! # Example
//!
//! ```ignore
//! let logger = RateLimitedLogger::new(Duration::from_secs(10));
//!
//! // Only logs once per 10 seconds, even if called frequently
//! for _ in 0..1000 {
//!     logger.warn("access-log", &WriterError::Backpressure { capacity: 16 });
//! }
//! ```

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between log lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Logs at most once per interval, counting what it suppresses
///
/// Thread-safe: counters are atomics, the last log time sits behind a
/// short-lived mutex.
#[derive(Debug)]
pub struct RateLimitedLogger {
    /// Minimum interval between log lines
    min_interval: Duration,

    /// Last time we logged
    last_log_time: Mutex<Option<Instant>>,

    /// Events since the last log line
    event_count: AtomicU64,

    /// Events ever recorded
    total_events: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a logger with the given interval
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            event_count: AtomicU64::new(0),
            total_events: AtomicU64::new(0),
        }
    }

    /// Record an event for `writer` and log a warning if the interval elapsed
    ///
    /// Returns true if a line was logged, false if it was suppressed.
    pub fn warn(&self, writer: &str, error: &dyn Display) -> bool {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        self.total_events.fetch_add(1, Ordering::Relaxed);

        if !self.should_log() {
            return false;
        }

        let count = self.event_count.swap(0, Ordering::Relaxed);
        let total = self.total_events.load(Ordering::Relaxed);

        if count > 1 {
            tracing::warn!(
                writer = %writer,
                error = %error,
                suppressed_count = count - 1,
                total = total,
                "write rejected (rate-limited)"
            );
        } else {
            tracing::warn!(
                writer = %writer,
                error = %error,
                total = total,
                "write rejected"
            );
        }
        true
    }

    fn should_log(&self) -> bool {
        let mut last_time = self.last_log_time.lock();
        let now = Instant::now();

        match *last_time {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                *last_time = Some(now);
                true
            }
        }
    }

    /// Events recorded since the last log line
    pub fn pending_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    /// Events ever recorded
    pub fn total_count(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriterError;

    #[test]
    fn test_new_logger_counts_nothing() {
        let logger = RateLimitedLogger::new(Duration::from_secs(5));
        assert_eq!(logger.pending_count(), 0);
        assert_eq!(logger.total_count(), 0);
    }

    #[test]
    fn test_default_interval() {
        let logger = RateLimitedLogger::default();
        assert_eq!(logger.min_interval, DEFAULT_LOG_INTERVAL);
    }

    #[test]
    fn test_first_event_always_logs() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = WriterError::Backpressure { capacity: 4 };

        assert!(logger.warn("test", &error));
        assert_eq!(logger.total_count(), 1);
        assert_eq!(logger.pending_count(), 0);
    }

    #[test]
    fn test_rapid_events_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = WriterError::Backpressure { capacity: 4 };

        assert!(logger.warn("test", &error));
        for _ in 0..10 {
            assert!(!logger.warn("test", &error));
        }

        assert_eq!(logger.total_count(), 11);
        assert_eq!(logger.pending_count(), 10);
    }

    #[test]
    fn test_zero_interval_logs_every_event() {
        let logger = RateLimitedLogger::new(Duration::ZERO);
        let error = WriterError::Closed;

        assert!(logger.warn("test", &error));
        assert!(logger.warn("test", &error));
        assert_eq!(logger.pending_count(), 0);
    }
}
