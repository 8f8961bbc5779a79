//! Lock-free writer metrics
//!
//! Counters are plain atomics mutated with `fetch_add`/`fetch_sub`; readers
//! never take a lock. A `WriterMetrics` can be shared by several writers
//! (pass the same `Arc` to each builder) to aggregate a writer group.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counters describing a writer's progress
#[derive(Debug, Default)]
pub struct WriterMetrics {
    /// Payloads accepted by `write`
    submitted: AtomicU64,

    /// Payloads accepted but not yet flushed (signed: reads clamp at zero)
    pending: AtomicI64,

    /// Bytes the sink acknowledged
    bytes_written: AtomicU64,

    /// Successful flush calls
    flushes: AtomicU64,

    /// Payloads rejected by backpressure
    rejected: AtomicU64,
}

impl WriterMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            pending: AtomicI64::new(0),
            bytes_written: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Record an accepted payload
    #[inline]
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful flush of `items` payloads totalling `bytes`
    #[inline]
    pub fn record_flush(&self, items: u64, bytes: u64) {
        self.pending.fetch_sub(items as i64, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes that reached the sink before a flush failed
    #[inline]
    pub fn record_partial(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a backpressure rejection
    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop `items` payloads from the pending count without flushing them
    ///
    /// The flush loop calls this on exit with every payload it still held,
    /// which brings a writer's pending contribution back to zero even when
    /// the counters are shared with other writers.
    #[inline]
    pub fn record_discarded(&self, items: u64) {
        self.pending.fetch_sub(items as i64, Ordering::Relaxed);
    }

    /// Payloads accepted since creation
    #[inline]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Payloads accepted but not yet flushed
    #[inline]
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed).max(0) as u64
    }

    /// Bytes acknowledged by the sink
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Successful flushes
    #[inline]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Backpressure rejections
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted(),
            pending: self.pending(),
            bytes_written: self.bytes_written(),
            flushes: self.flushes(),
            rejected: self.rejected(),
        }
    }
}

/// Point-in-time snapshot of writer metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub pending: u64,
    pub bytes_written: u64,
    pub flushes: u64,
    pub rejected: u64,
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_test;
