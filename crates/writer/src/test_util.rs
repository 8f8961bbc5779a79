//! In-memory sinks for tests

use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::AsyncWrite;

/// Sink that appends everything it accepts to a shared buffer
///
/// Clones share state, so a test keeps one clone to inspect while the
/// writer owns another.
#[derive(Debug, Clone)]
pub(crate) struct MemorySink {
    state: Arc<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    data: Mutex<Vec<u8>>,
    vectored: bool,
    max_chunk: AtomicUsize,
    failing: AtomicBool,
    write_calls: AtomicUsize,
    vectored_calls: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MemorySink {
    /// Sink without a vectored write path
    pub(crate) fn new() -> Self {
        Self::with_vectored(false)
    }

    /// Sink that reports `is_write_vectored`
    pub(crate) fn vectored() -> Self {
        Self::with_vectored(true)
    }

    fn with_vectored(vectored: bool) -> Self {
        Self {
            state: Arc::new(MemoryState {
                data: Mutex::new(Vec::new()),
                vectored,
                max_chunk: AtomicUsize::new(usize::MAX),
                failing: AtomicBool::new(false),
                write_calls: AtomicUsize::new(0),
                vectored_calls: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
            }),
        }
    }

    /// Accept at most `max` bytes per call (0 makes every call a zero-length write)
    pub(crate) fn with_max_chunk(self, max: usize) -> Self {
        self.state.max_chunk.store(max, Ordering::Relaxed);
        self
    }

    /// Make every following write fail with `BrokenPipe`
    pub(crate) fn fail(&self) {
        self.state.failing.store(true, Ordering::Relaxed);
    }

    pub(crate) fn contents(&self) -> Vec<u8> {
        self.state.data.lock().clone()
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.state.write_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn vectored_calls(&self) -> usize {
        self.state.vectored_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::Relaxed)
    }

    fn accept(&self, bufs: &[&[u8]]) -> io::Result<usize> {
        if self.state.failing.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink failed"));
        }

        let limit = self.state.max_chunk.load(Ordering::Relaxed);
        let mut data = self.state.data.lock();
        let mut accepted = 0;
        for buf in bufs {
            let take = (limit - accepted).min(buf.len());
            data.extend_from_slice(&buf[..take]);
            accepted += take;
            if accepted == limit {
                break;
            }
        }
        Ok(accepted)
    }
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.state.write_calls.fetch_add(1, Ordering::Relaxed);
        Poll::Ready(self.accept(&[buf]))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.state.vectored_calls.fetch_add(1, Ordering::Relaxed);
        let slices: Vec<&[u8]> = bufs.iter().map(|b| &**b).collect();
        Poll::Ready(self.accept(&slices))
    }

    fn is_write_vectored(&self) -> bool {
        self.state.vectored
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.state.shutdowns.fetch_add(1, Ordering::Relaxed);
        Poll::Ready(Ok(()))
    }
}
