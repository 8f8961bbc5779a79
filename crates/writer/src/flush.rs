//! The flush loop: single consumer of a writer's pending queue
//!
//! One `FlushLoop` exists per writer and it is the only code that touches the
//! writer's sink. It collects frames into a [`FlushContext`] and flushes when
//! a trigger fires:
//!
//! - the flush timer, armed `max_flush_delay` after the first payload of a
//!   cycle (reset, never reallocated);
//! - an always-ready trigger when `max_flush_delay` is zero, so a cycle is
//!   flushed as soon as the queue runs dry;
//! - the cycle holding `max_in_flight` payloads.
//!
//! Collection is two-phase: frames are drained with `try_recv` while any are
//! available, and only an empty queue falls through to a `select!` between
//! the trigger and the next frame. Under load the loop never parks.
//!
//! On the close marker the queue is closed and the loop keeps collecting until
//! every reserved slot has been sent or returned, then flushes once more.
//!
//! A sink error (or write timeout) ends the loop: the error is latched on the
//! writer, everything still queued is discarded and its buffers go back to
//! the pool.

use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Instant, Sleep};

use crate::context::{ContextPool, FlushContext};
use crate::dispatch::FlushTask;
use crate::error::{Result, WriterError};
use crate::sink::SinkAdapter;
use crate::writer::Shared;

/// Deadline of the flush timer while no cycle is armed
const IDLE_TIMER_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Element of the pending queue
#[derive(Debug)]
pub(crate) enum Frame {
    /// A copied payload
    Data(BytesMut),
    /// Close marker; FIFO after every payload accepted before it
    ///
    /// Payloads sent by producers that reserved their slot before the close
    /// flag was set can still land behind it; they are flushed too.
    Close,
}

enum Event {
    Frame(Option<Frame>),
    Deadline,
}

/// Drives one writer: drains its queue and flushes into the sink
///
/// Spawned writers run this on their [`Dispatch`](crate::Dispatch). Writers
/// built with [`build`](crate::BatchWriterBuilder::build) hand it to the
/// caller, who must run it (`run().await`) for writes to reach the sink and
/// for `close` to complete.
///
/// Dropping the loop before it finishes marks the writer closed and discards
/// whatever it still held.
#[derive(Debug)]
pub struct FlushLoop<W> {
    shared: Arc<Shared>,
    receiver: mpsc::Receiver<Frame>,
    sink: SinkAdapter<W>,
    contexts: Arc<ContextPool>,
    ctx: FlushContext,
    coalesce: bool,
    max_flush_delay: Duration,
    batch_limit: usize,
    shutdown_sink: bool,
    finished: bool,
}

impl<W> FlushLoop<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        shared: Arc<Shared>,
        receiver: mpsc::Receiver<Frame>,
        sink: SinkAdapter<W>,
        contexts: Arc<ContextPool>,
        coalesce: bool,
        max_flush_delay: Duration,
        shutdown_sink: bool,
    ) -> Self {
        let batch_limit = shared.capacity;
        Self {
            shared,
            receiver,
            sink,
            contexts,
            ctx: FlushContext::default(),
            coalesce,
            max_flush_delay,
            batch_limit,
            shutdown_sink,
            finished: false,
        }
    }

    /// Name of the writer this loop drives
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Run until the writer is closed or the sink fails
    ///
    /// Returns `Ok(())` after a clean close, or the error that stopped the
    /// loop (the same error later writes observe).
    pub async fn run(mut self) -> Result<()> {
        self.ctx = self.contexts.acquire();

        let mode = if self.coalesce { "coalesce" } else { "vectored" };
        tracing::info!(
            writer = %self.shared.name,
            mode,
            capacity = self.batch_limit,
            max_flush_delay = ?self.max_flush_delay,
            vectored_sink = self.sink.supports_vectored(),
            "flush loop started"
        );

        let exit = self.collect().await;
        self.finish(exit).await
    }

    /// Box the loop for a [`Dispatch`](crate::Dispatch)
    pub fn into_task(self) -> FlushTask {
        Box::pin(async move {
            // The outcome is latched on the writer
            let _ = self.run().await;
        })
    }

    /// Collect and flush until the loop must stop; returns the exit reason
    async fn collect(&mut self) -> WriterError {
        let eager = self.max_flush_delay.is_zero();
        let deadline = tokio::time::sleep(IDLE_TIMER_DELAY);
        tokio::pin!(deadline);
        let mut armed = false;
        let mut closing = false;

        loop {
            let event = match self.receiver.try_recv() {
                Ok(frame) => Event::Frame(Some(frame)),
                Err(TryRecvError::Disconnected) => Event::Frame(None),
                Err(TryRecvError::Empty) => {
                    tokio::select! {
                        biased;
                        _ = flush_trigger(deadline.as_mut(), eager), if armed => Event::Deadline,
                        frame = self.receiver.recv() => Event::Frame(frame),
                    }
                }
            };

            match event {
                Event::Deadline => {
                    armed = false;
                    if let Err(err) = self.flush().await {
                        return err;
                    }
                }
                Event::Frame(Some(Frame::Data(buf))) => {
                    self.accumulate(buf);
                    if self.ctx.items() >= self.batch_limit {
                        armed = false;
                        if let Err(err) = self.flush().await {
                            return err;
                        }
                    } else if !armed {
                        if !eager {
                            deadline
                                .as_mut()
                                .reset(Instant::now() + self.max_flush_delay);
                        }
                        armed = true;
                    }
                }
                Event::Frame(Some(Frame::Close)) => {
                    tracing::debug!(writer = %self.shared.name, "close marker received");
                    // A producer that reserved its slot before the close flag was
                    // set may still send; keep collecting until every slot is back
                    closing = true;
                    self.receiver.close();
                }
                Event::Frame(None) => {
                    if !closing {
                        tracing::debug!(writer = %self.shared.name, "all writer handles dropped");
                    }
                    return self.flush().await.err().unwrap_or(WriterError::Closed);
                }
            }
        }
    }

    #[inline]
    fn accumulate(&mut self, buf: BytesMut) {
        if self.coalesce {
            self.ctx.push_coalesced(buf, &self.shared.pool);
        } else {
            self.ctx.push_buffer(buf);
        }
    }

    /// Write the current cycle to the sink
    async fn flush(&mut self) -> Result<()> {
        if self.ctx.is_empty() {
            return Ok(());
        }

        let items = self.ctx.items();
        let written = if self.coalesce {
            self.sink.write(self.ctx.coalesced()).await
        } else {
            self.sink.write_buffers(self.ctx.buffers()).await
        };

        match written {
            Ok(bytes) => {
                self.shared.metrics.record_flush(items as u64, bytes as u64);
                self.ctx.finish_cycle(&self.shared.pool);
                tracing::trace!(writer = %self.shared.name, items, bytes, "flushed");
                Ok(())
            }
            Err(failure) => {
                self.shared.metrics.record_partial(failure.written as u64);
                Err(failure.error)
            }
        }
    }

    async fn finish(&mut self, exit: WriterError) -> Result<()> {
        let mut result = if exit.is_sink_failure() {
            tracing::error!(
                writer = %self.shared.name,
                error = %exit,
                "sink failed, closing writer"
            );
            // Latch first so producers woken by the channel closing see it
            self.shared.latch(exit.clone());
            Err(exit)
        } else {
            self.shared.mark_closed();
            Ok(())
        };

        let discarded = self.release_pending().await;

        if self.shutdown_sink
            && let Err(err) = self.sink.shutdown().await
        {
            tracing::warn!(writer = %self.shared.name, error = %err, "sink shutdown failed");
            if result.is_ok() {
                result = Err(err);
            }
        }

        match &result {
            Ok(()) => self.shared.latch(WriterError::Closed),
            Err(err) => self.shared.latch(err.clone()),
        }
        self.finished = true;
        self.shared.signal_done();

        tracing::info!(
            writer = %self.shared.name,
            submitted = self.shared.metrics.submitted(),
            bytes_written = self.shared.metrics.bytes_written(),
            discarded,
            "flush loop stopped"
        );
        result
    }

    /// Close the queue and discard everything still held
    async fn release_pending(&mut self) -> u64 {
        self.receiver.close();

        let mut discarded = self.ctx.items() as u64;
        self.ctx.finish_cycle(&self.shared.pool);

        // Waits for producers holding a reserved slot to finish their send
        while let Some(frame) = self.receiver.recv().await {
            if let Frame::Data(buf) = frame {
                self.shared.pool.release(buf);
                discarded += 1;
            }
        }

        self.shared.metrics.record_discarded(discarded);
        self.contexts.release(mem::take(&mut self.ctx));
        discarded
    }
}

impl<W> Drop for FlushLoop<W> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        self.shared.latch(WriterError::Closed);
        self.receiver.close();

        let mut discarded = self.ctx.items() as u64;
        self.ctx.finish_cycle(&self.shared.pool);
        while let Ok(frame) = self.receiver.try_recv() {
            if let Frame::Data(buf) = frame {
                self.shared.pool.release(buf);
                discarded += 1;
            }
        }
        self.shared.metrics.record_discarded(discarded);
        self.contexts.release(mem::take(&mut self.ctx));
        self.shared.signal_done();

        tracing::debug!(
            writer = %self.shared.name,
            discarded,
            "flush loop dropped before finishing"
        );
    }
}

/// Resolves when the armed cycle should be flushed
async fn flush_trigger(deadline: Pin<&mut Sleep>, eager: bool) {
    if !eager {
        deadline.await;
    }
}

#[cfg(test)]
#[path = "flush_test.rs"]
mod flush_test;
