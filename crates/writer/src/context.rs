//! Accumulation context owned by a flush loop
//!
//! A `FlushContext` holds what the loop has collected since the last flush:
//! one contiguous buffer in coalescing mode, or the discrete payload buffers
//! in vectored mode. Only the loop that acquired it touches it.
//!
//! Contexts keep their allocations between cycles and between writers: a
//! loop takes one from a shared [`ContextPool`] when it starts and hands it
//! back on exit.

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

use crate::buffer_pool::BufferPool;

/// Default number of idle contexts a pool keeps
pub const DEFAULT_CONTEXT_POOL_SIZE: usize = 64;

/// Coalescing buffers larger than this are not kept by the pool
pub const MAX_RETAINED_COALESCE_CAPACITY: usize = 4 * 1024 * 1024;

/// Payloads collected during the current flush cycle
#[derive(Debug, Default)]
pub struct FlushContext {
    /// Concatenated payloads (coalescing mode)
    coalesced: BytesMut,

    /// Discrete payload buffers in enqueue order (vectored mode)
    buffers: Vec<BytesMut>,

    /// Payloads collected this cycle
    items: usize,
}

impl FlushContext {
    /// Append a payload by copying it into the contiguous buffer
    ///
    /// The payload buffer goes straight back to the pool.
    #[inline]
    pub fn push_coalesced(&mut self, buf: BytesMut, pool: &BufferPool) {
        self.coalesced.extend_from_slice(&buf);
        pool.release(buf);
        self.items += 1;
    }

    /// Append a payload buffer for a vectored write
    #[inline]
    pub fn push_buffer(&mut self, buf: BytesMut) {
        self.buffers.push(buf);
        self.items += 1;
    }

    /// Payloads collected this cycle
    #[inline]
    pub fn items(&self) -> usize {
        self.items
    }

    /// True if nothing was collected this cycle
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Bytes collected this cycle
    pub fn byte_len(&self) -> usize {
        self.coalesced.len() + self.buffers.iter().map(BytesMut::len).sum::<usize>()
    }

    /// Contiguous bytes collected in coalescing mode
    #[inline]
    pub fn coalesced(&self) -> &[u8] {
        &self.coalesced
    }

    /// Discrete buffers collected in vectored mode
    #[inline]
    pub fn buffers(&self) -> &[BytesMut] {
        &self.buffers
    }

    /// End the cycle: return payload buffers to the pool, keep capacity
    pub fn finish_cycle(&mut self, pool: &BufferPool) {
        self.coalesced.clear();
        pool.release_all(&mut self.buffers);
        self.items = 0;
    }

    /// Capacity of the contiguous buffer
    #[inline]
    pub fn coalesced_capacity(&self) -> usize {
        self.coalesced.capacity()
    }

    /// Drop collected state without a pool to return buffers to
    fn clear(&mut self) {
        self.coalesced.clear();
        self.buffers.clear();
        self.items = 0;
    }
}

/// Lock-free pool of idle [`FlushContext`]s shared between writers
#[derive(Debug)]
pub struct ContextPool {
    queue: ArrayQueue<FlushContext>,
}

impl ContextPool {
    /// Create a pool that keeps at most `size` idle contexts
    pub fn new(size: usize) -> Self {
        Self {
            queue: ArrayQueue::new(size.max(1)),
        }
    }

    /// Take an empty context, allocating one if the pool is empty
    #[inline]
    pub fn acquire(&self) -> FlushContext {
        self.queue.pop().unwrap_or_default()
    }

    /// Hand a context back
    ///
    /// It is cleared first; contexts whose coalescing buffer grew past
    /// [`MAX_RETAINED_COALESCE_CAPACITY`] are dropped.
    pub fn release(&self, mut ctx: FlushContext) {
        ctx.clear();
        if ctx.coalesced_capacity() > MAX_RETAINED_COALESCE_CAPACITY {
            return;
        }
        let _ = self.queue.push(ctx);
    }

    /// Number of idle contexts
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesced_cycle() {
        let pool = BufferPool::new(4, 16);
        let mut ctx = FlushContext::default();

        ctx.push_coalesced(pool.acquire_copy(b"abc"), &pool);
        ctx.push_coalesced(pool.acquire_copy(b"def"), &pool);

        assert_eq!(ctx.items(), 2);
        assert_eq!(ctx.coalesced(), b"abcdef");
        assert_eq!(ctx.byte_len(), 6);
        // Payload buffers went straight back
        assert_eq!(pool.available(), 4);

        let capacity = ctx.coalesced_capacity();
        ctx.finish_cycle(&pool);
        assert!(ctx.is_empty());
        assert!(ctx.coalesced().is_empty());
        assert_eq!(ctx.coalesced_capacity(), capacity);
    }

    #[test]
    fn test_vectored_cycle_returns_buffers() {
        let pool = BufferPool::new(4, 16);
        let mut ctx = FlushContext::default();

        ctx.push_buffer(pool.acquire_copy(b"one"));
        ctx.push_buffer(pool.acquire_copy(b"two"));
        assert_eq!(pool.available(), 2);
        assert_eq!(ctx.buffers().len(), 2);
        assert_eq!(&ctx.buffers()[1][..], b"two");
        assert_eq!(ctx.byte_len(), 6);

        ctx.finish_cycle(&pool);
        assert!(ctx.buffers().is_empty());
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_context_pool_reuses_cleared_context() {
        let buffers = BufferPool::new(2, 16);
        let contexts = ContextPool::new(2);

        let mut ctx = contexts.acquire();
        ctx.push_coalesced(buffers.acquire_copy(b"leftover"), &buffers);
        ctx.push_buffer(buffers.acquire_copy(b"queued"));
        contexts.release(ctx);
        assert_eq!(contexts.available(), 1);

        let ctx = contexts.acquire();
        assert!(ctx.is_empty());
        assert!(ctx.coalesced().is_empty());
        assert!(ctx.buffers().is_empty());
        assert!(ctx.coalesced_capacity() >= 8);
    }

    #[test]
    fn test_context_pool_drops_oversized() {
        let buffers = BufferPool::new(1, 16);
        let contexts = ContextPool::new(2);

        let mut ctx = contexts.acquire();
        let big = vec![0u8; MAX_RETAINED_COALESCE_CAPACITY + 1];
        let mut buf = buffers.acquire();
        buf.extend_from_slice(&big);
        ctx.push_coalesced(buf, &buffers);
        contexts.release(ctx);

        assert_eq!(contexts.available(), 0);
    }
}
