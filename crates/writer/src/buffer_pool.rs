//! Lock-free buffer pool for payload copies
//!
//! Every accepted payload is copied into a pooled `BytesMut` before it is
//! queued, so producers never wait on the flush loop to finish with their
//! slice. Buffers come back to the pool once their bytes have reached the
//! sink (or have been copied into the coalescing buffer).
//!
//! The pool is an explicit resource: create one and share it with `Arc`
//! across as many writers as should recycle the same buffers.
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(BufferPool::new(1024, 512));
//!
//! let mut buf = pool.acquire();
//! buf.extend_from_slice(b"payload");
//! // ... flushed ...
//! pool.release(buf);
//! ```

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of pooled buffers
pub const DEFAULT_POOL_SIZE: usize = 1024;

/// Default capacity of a fresh buffer (fits a typical log line)
pub const DEFAULT_BUFFER_CAPACITY: usize = 512;

/// Buffers that grew beyond this are dropped instead of pooled
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// Lock-free pool of reusable `BytesMut` buffers
///
/// `acquire` never blocks: when the pool is exhausted a new buffer is
/// allocated. `release` always clears the buffer first, so no bytes from a
/// previous payload can surface in an unrelated writer sharing the pool.
#[derive(Debug)]
pub struct BufferPool {
    /// Lock-free queue of available buffers
    queue: ArrayQueue<BytesMut>,

    /// Capacity for each fresh buffer
    buffer_capacity: usize,

    /// Largest capacity a released buffer may have and still be pooled
    max_retained_capacity: usize,

    metrics: BufferPoolMetrics,
}

/// Metrics for buffer pool monitoring
#[derive(Debug, Default)]
pub struct BufferPoolMetrics {
    /// Number of successful pool hits (buffer reused)
    pub hits: AtomicU64,

    /// Number of pool misses (new allocation required)
    pub misses: AtomicU64,

    /// Number of buffers returned to pool
    pub returns: AtomicU64,

    /// Number of buffers dropped (pool full or capacity out of range)
    pub drops: AtomicU64,
}

impl BufferPoolMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }
}

/// Point-in-time snapshot of buffer pool metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub drops: u64,
}

impl PoolSnapshot {
    /// Calculate hit rate from snapshot
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl BufferPool {
    /// Create a new buffer pool with pre-allocated buffers
    ///
    /// # Arguments
    ///
    /// * `pool_size` - Number of buffers to pre-allocate (and the most the pool keeps)
    /// * `buffer_capacity` - Capacity of each fresh buffer in bytes
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        Self::with_max_retained(
            pool_size,
            buffer_capacity,
            DEFAULT_MAX_RETAINED_CAPACITY.max(buffer_capacity),
        )
    }

    /// Create a pool that drops released buffers larger than `max_retained_capacity`
    pub fn with_max_retained(
        pool_size: usize,
        buffer_capacity: usize,
        max_retained_capacity: usize,
    ) -> Self {
        let queue = ArrayQueue::new(pool_size.max(1));

        for _ in 0..pool_size {
            // Filling an empty queue up to its capacity cannot fail
            let _ = queue.push(BytesMut::with_capacity(buffer_capacity));
        }

        Self {
            queue,
            buffer_capacity,
            max_retained_capacity: max_retained_capacity.max(buffer_capacity),
            metrics: BufferPoolMetrics::new(),
        }
    }

    /// Get an empty buffer, reusing a pooled one when available
    #[inline]
    pub fn acquire(&self) -> BytesMut {
        match self.queue.pop() {
            Some(buf) => {
                self.metrics.record_hit();
                buf
            }
            None => {
                self.metrics.record_miss();
                BytesMut::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Get a buffer holding a copy of `payload`
    #[inline]
    pub fn acquire_copy(&self, payload: &[u8]) -> BytesMut {
        let mut buf = self.acquire();
        buf.extend_from_slice(payload);
        buf
    }

    /// Return a buffer to the pool
    ///
    /// The buffer is cleared first. It is kept only if its capacity lies in
    /// `[buffer_capacity, max_retained_capacity]` and the pool has room;
    /// otherwise it is dropped.
    #[inline]
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();

        let capacity = buf.capacity();
        if capacity < self.buffer_capacity || capacity > self.max_retained_capacity {
            self.metrics.record_drop();
            return;
        }

        match self.queue.push(buf) {
            Ok(()) => self.metrics.record_return(),
            Err(_) => self.metrics.record_drop(),
        }
    }

    /// Return every buffer in `bufs`, leaving the vector empty
    #[inline]
    pub fn release_all(&self, bufs: &mut Vec<BytesMut>) {
        for buf in bufs.drain(..) {
            self.release(buf);
        }
    }

    /// Get the number of buffers currently available in the pool
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Get the pool capacity (maximum number of buffers)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Get the capacity of fresh buffers
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Get reference to metrics
    #[inline]
    pub fn metrics(&self) -> &BufferPoolMetrics {
        &self.metrics
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if the pool is full
    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
#[path = "buffer_pool_test.rs"]
mod buffer_pool_test;
