//! Producer handle and builder
//!
//! A [`BatchWriter`] is the cheap, cloneable handle producers write through.
//! Each accepted payload is copied into a pooled buffer and queued for the
//! writer's [`FlushLoop`]; the call returns as soon as the payload is queued.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──close()──▶ Closing ──loop drained──▶ Closed
//!   │                                            ▲
//!   └──────────── sink error / timeout ──────────┘
//! ```
//!
//! Once closed the writer stays closed: every later call returns the latched
//! terminal error (`Closed` after a clean close, the sink error otherwise).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::AsyncWrite;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Permit};
use tokio::sync::watch;

use crate::buffer_pool::BufferPool;
use crate::config::{WriteMode, WriterConfig};
use crate::context::ContextPool;
use crate::dispatch::{Dispatch, TokioDispatch};
use crate::error::{ConfigError, Result, WriterError};
use crate::flush::{FlushLoop, Frame};
use crate::metrics::WriterMetrics;
use crate::rate_limited_logger::RateLimitedLogger;
use crate::sink::SinkAdapter;

/// State shared between the handles and the flush loop
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) capacity: usize,
    pub(crate) metrics: Arc<WriterMetrics>,
    pub(crate) pool: Arc<BufferPool>,
    block_on_full: bool,
    closed: AtomicBool,
    error: OnceLock<WriterError>,
    done: watch::Sender<bool>,
    rejections: RateLimitedLogger,
}

impl Shared {
    /// Stop accepting writes
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Record the terminal error (first one wins) and stop accepting writes
    pub(crate) fn latch(&self, err: WriterError) {
        let _ = self.error.set(err);
        self.mark_closed();
    }

    /// Wake everything waiting for the loop to finish
    pub(crate) fn signal_done(&self) {
        self.done.send_replace(true);
    }

    fn terminal_error(&self) -> WriterError {
        self.error.get().cloned().unwrap_or(WriterError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Cloneable producer handle of a batching writer
///
/// # Example
///
/// ```ignore
/// let file = tokio::fs::File::create("access.log").await?;
/// let writer = BatchWriter::spawn(file, WriterConfig::coalescing(Duration::from_millis(5)))?;
///
/// writer.write(b"GET / 200\n").await?;
/// writer.close().await?;
/// ```
#[derive(Debug, Clone)]
pub struct BatchWriter {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Frame>,
}

impl BatchWriter {
    /// Start building a writer around `sink`
    pub fn builder<W>(sink: W) -> BatchWriterBuilder<W>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        BatchWriterBuilder::new(sink)
    }

    /// Create a writer with `config` and spawn its flush loop on the current runtime
    pub fn spawn<W>(sink: W, config: WriterConfig) -> Result<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::builder(sink).config(config).spawn()
    }

    /// Queue `payload` for the sink
    ///
    /// Returns `Ok(payload.len())` once the payload is copied and queued; an
    /// empty payload returns `Ok(0)` without queueing anything. When the queue
    /// is full this rejects with [`WriterError::Backpressure`], or waits for a
    /// slot if the writer was configured with `block_on_full`.
    pub async fn write(&self, payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;

        let permit = if self.shared.block_on_full {
            self.sender
                .reserve()
                .await
                .map_err(|_| self.shared.terminal_error())?
        } else {
            self.try_reserve()?
        };
        self.enqueue(permit, payload)
    }

    /// Queue `payload` without ever waiting
    ///
    /// Same as [`write`](Self::write) except a full queue always rejects,
    /// whatever the blocking policy.
    pub fn try_write(&self, payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;

        let permit = self.try_reserve()?;
        self.enqueue(permit, payload)
    }

    /// Close the writer and wait until everything queued before this call
    /// has been flushed
    ///
    /// Only the first call closes; later calls return the latched terminal
    /// error ([`WriterError::Closed`] after a clean close). A sink error hit
    /// while draining is returned here.
    pub async fn close(&self) -> Result<()> {
        if self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.shared.terminal_error());
        }

        tracing::debug!(writer = %self.shared.name, "closing writer");

        // Fails only if the loop already stopped; it has then latched its error
        if let Ok(permit) = self.sender.reserve().await {
            permit.send(Frame::Close);
        }
        self.wait_closed().await;

        match self.shared.error.get() {
            None | Some(WriterError::Closed) => Ok(()),
            Some(err) => Err(err.clone()),
        }
    }

    /// Wait until the flush loop has stopped, without closing the writer
    pub async fn wait_closed(&self) {
        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, so this only returns once done is set
        let _ = done.wait_for(|done| *done).await;
    }

    /// True once the writer stopped accepting writes
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The latched terminal error, if the writer has stopped
    pub fn terminal_error(&self) -> Option<WriterError> {
        self.shared.error.get().cloned()
    }

    /// Counters of this writer (shared with other writers if injected)
    pub fn metrics(&self) -> &Arc<WriterMetrics> {
        &self.shared.metrics
    }

    /// Payloads accepted so far
    pub fn submitted_count(&self) -> u64 {
        self.shared.metrics.submitted()
    }

    /// Payloads accepted but not yet flushed
    pub fn pending_count(&self) -> u64 {
        self.shared.metrics.pending()
    }

    /// Bytes acknowledged by the sink
    pub fn bytes_written(&self) -> u64 {
        self.shared.metrics.bytes_written()
    }

    /// Frames currently sitting in the queue
    pub fn queue_len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Capacity of the queue (resolved `max_in_flight`)
    pub fn queue_capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Writer name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Buffer pool payloads are copied into
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.shared.pool
    }

    fn ensure_open(&self) -> Result<()> {
        if let Some(err) = self.shared.error.get() {
            return Err(err.clone());
        }
        if self.shared.is_closed() {
            return Err(WriterError::Closed);
        }
        Ok(())
    }

    fn try_reserve(&self) -> Result<Permit<'_, Frame>> {
        match self.sender.try_reserve() {
            Ok(permit) => Ok(permit),
            Err(TrySendError::Full(())) => {
                let err = WriterError::Backpressure {
                    capacity: self.shared.capacity,
                };
                self.shared.metrics.record_rejected();
                self.shared.rejections.warn(&self.shared.name, &err);
                Err(err)
            }
            Err(TrySendError::Closed(())) => Err(self.shared.terminal_error()),
        }
    }

    /// Send `payload` on a reserved slot, unless the writer closed meanwhile
    ///
    /// A frame sent after the close marker would only be picked up by the
    /// loop's final drain, so a close seen here rejects and the slot is
    /// returned unused.
    #[inline]
    fn enqueue(&self, permit: Permit<'_, Frame>, payload: &[u8]) -> Result<usize> {
        if self.shared.is_closed() {
            drop(permit);
            return Err(self.shared.terminal_error());
        }
        self.shared.metrics.record_submitted();
        permit.send(Frame::Data(self.shared.pool.acquire_copy(payload)));
        Ok(payload.len())
    }
}

/// Builder for [`BatchWriter`]
///
/// Pools and metrics default to fresh per-writer instances; pass shared
/// `Arc`s to recycle buffers or aggregate counters across writers.
#[derive(Debug)]
pub struct BatchWriterBuilder<W> {
    sink: W,
    config: WriterConfig,
    buffer_pool: Option<Arc<BufferPool>>,
    context_pool: Option<Arc<ContextPool>>,
    metrics: Option<Arc<WriterMetrics>>,
}

impl<W> BatchWriterBuilder<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Start a builder with the default config
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            config: WriterConfig::default(),
            buffer_pool: None,
            context_pool: None,
            metrics: None,
        }
    }

    /// Use `config`
    #[must_use]
    pub fn config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Copy payloads into buffers from `pool`
    #[must_use]
    pub fn buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.buffer_pool = Some(pool);
        self
    }

    /// Take the flush loop's context from `pool`
    #[must_use]
    pub fn context_pool(mut self, pool: Arc<ContextPool>) -> Self {
        self.context_pool = Some(pool);
        self
    }

    /// Record into `metrics`
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<WriterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create the writer and its flush loop without starting the loop
    ///
    /// The loop does nothing until the caller runs it.
    pub fn build(self) -> Result<(BatchWriter, FlushLoop<W>)> {
        self.config.validate()?;

        let config = self.config;
        let capacity = config.effective_max_in_flight();
        let (sender, receiver) = mpsc::channel(capacity);
        let (done, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            name: config.name.clone(),
            capacity,
            metrics: self.metrics.unwrap_or_default(),
            pool: self.buffer_pool.unwrap_or_default(),
            block_on_full: config.block_on_full,
            closed: AtomicBool::new(false),
            error: OnceLock::new(),
            done,
            rejections: RateLimitedLogger::default(),
        });

        let flush_loop = FlushLoop::new(
            Arc::clone(&shared),
            receiver,
            SinkAdapter::new(self.sink, config.write_timeout),
            self.context_pool.unwrap_or_default(),
            config.write_mode.coalesces(),
            config.max_flush_delay,
            config.shutdown_sink,
        );

        tracing::debug!(
            writer = %config.name,
            mode = config.write_mode.as_str(),
            capacity,
            "writer created"
        );

        Ok((BatchWriter { shared, sender }, flush_loop))
    }

    /// Create the writer and spawn its flush loop on the current tokio runtime
    pub fn spawn(self) -> Result<BatchWriter> {
        self.ensure_spawnable()?;
        let dispatcher = TokioDispatch::current()?;
        self.spawn_on(&dispatcher)
    }

    /// Create the writer and hand its flush loop to `dispatcher`
    pub fn spawn_on<D>(self, dispatcher: &D) -> Result<BatchWriter>
    where
        D: Dispatch + ?Sized,
    {
        self.ensure_spawnable()?;
        let (writer, flush_loop) = self.build()?;
        dispatcher.dispatch(flush_loop.into_task());
        Ok(writer)
    }

    fn ensure_spawnable(&self) -> Result<()> {
        if self.config.write_mode == WriteMode::Manual {
            return Err(ConfigError::ManualModeSpawn.into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
