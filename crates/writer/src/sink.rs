//! Sink adapter: picks the write path for whatever the writer drains into
//!
//! Any `tokio::io::AsyncWrite` can be a sink. On construction the adapter
//! asks the sink whether it has an efficient scatter/gather path
//! (`is_write_vectored`). Multi-buffer flushes use `write_vectored` when it
//! does and fall back to one write per buffer when it does not.
//!
//! Every flush runs to completion: short writes (plain or vectored) are
//! resumed at the first unwritten byte until all buffers are drained, the
//! sink errors, or the optional write deadline expires. A zero-length write
//! is reported as `WriteZero`.

use std::future::Future;
use std::io::{self, IoSlice};
use std::mem;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::WriterError;

/// A flush that did not complete
#[derive(Debug)]
pub struct SinkFailure {
    /// Bytes the sink accepted before the failure
    pub written: usize,

    /// Why the flush stopped
    pub error: WriterError,
}

/// Wraps a sink with deadline handling and write-path selection
#[derive(Debug)]
pub struct SinkAdapter<W> {
    inner: W,
    vectored: bool,
    write_timeout: Option<Duration>,
    /// Slice list of vectored flushes; kept empty between flushes
    slices: Vec<IoSlice<'static>>,
}

impl<W> SinkAdapter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap `inner`, applying `write_timeout` to every flush
    pub fn new(inner: W, write_timeout: Option<Duration>) -> Self {
        let vectored = inner.is_write_vectored();
        Self {
            inner,
            vectored,
            write_timeout,
            slices: Vec::new(),
        }
    }

    /// True if multi-buffer flushes go through `write_vectored`
    #[inline]
    pub fn supports_vectored(&self) -> bool {
        self.vectored
    }

    /// Deadline applied to each flush
    #[inline]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Write one contiguous buffer completely
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, SinkFailure> {
        let mut written = 0;
        let result = with_deadline(
            self.write_timeout,
            write_all(&mut self.inner, buf, &mut written),
        )
        .await;
        finish(result, written)
    }

    /// Write a list of buffers completely, in order
    pub async fn write_buffers(&mut self, bufs: &[BytesMut]) -> Result<usize, SinkFailure> {
        match bufs {
            [] => Ok(0),
            [single] => self.write(single).await,
            _ => {
                let mut written = 0;
                let result = if self.vectored {
                    let mut slices = recycle(mem::take(&mut self.slices));
                    slices.extend(bufs.iter().map(|b| IoSlice::new(b)));
                    let result = with_deadline(
                        self.write_timeout,
                        write_vectored_all(&mut self.inner, &mut slices, &mut written),
                    )
                    .await;
                    self.slices = recycle(slices);
                    result
                } else {
                    with_deadline(
                        self.write_timeout,
                        write_sequential(&mut self.inner, bufs, &mut written),
                    )
                    .await
                };
                finish(result, written)
            }
        }
    }

    /// Shut the sink down (flushes and closes it), under the write deadline
    pub async fn shutdown(&mut self) -> Result<(), WriterError> {
        with_deadline(self.write_timeout, self.inner.shutdown()).await
    }

    /// Slices the vectored scratch list can hold without reallocating
    #[cfg(test)]
    pub(crate) fn slice_capacity(&self) -> usize {
        self.slices.capacity()
    }

    /// Get a reference to the sink
    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the sink
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn finish(result: Result<(), WriterError>, written: usize) -> Result<usize, SinkFailure> {
    match result {
        Ok(()) => Ok(written),
        Err(error) => Err(SinkFailure { written, error }),
    }
}

/// Run a flush under the optional deadline
async fn with_deadline<F>(timeout: Option<Duration>, flush: F) -> Result<(), WriterError>
where
    F: Future<Output = io::Result<()>>,
{
    match timeout {
        None => flush.await.map_err(WriterError::sink),
        Some(limit) => match tokio::time::timeout(limit, flush).await {
            Ok(result) => result.map_err(WriterError::sink),
            Err(_) => Err(WriterError::Timeout(limit)),
        },
    }
}

async fn write_all<W>(sink: &mut W, mut buf: &[u8], written: &mut usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while !buf.is_empty() {
        let n = sink.write(buf).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        *written += n;
        buf = &buf[n..];
    }
    sink.flush().await
}

async fn write_sequential<W>(sink: &mut W, bufs: &[BytesMut], written: &mut usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for buf in bufs {
        let mut rest: &[u8] = buf;
        while !rest.is_empty() {
            let n = sink.write(rest).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            *written += n;
            rest = &rest[n..];
        }
    }
    sink.flush().await
}

async fn write_vectored_all<W>(
    sink: &mut W,
    mut remaining: &mut [IoSlice<'_>],
    written: &mut usize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Skips leading empty slices
    IoSlice::advance_slices(&mut remaining, 0);

    while !remaining.is_empty() {
        let n = sink.write_vectored(remaining).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        *written += n;
        IoSlice::advance_slices(&mut remaining, n);
    }
    sink.flush().await
}

/// Empty `slices` and hand its allocation back under a new lifetime
///
/// The vector is empty before it is collected, so the in-place collect only
/// moves the allocation.
fn recycle<'a, 'b>(mut slices: Vec<IoSlice<'a>>) -> Vec<IoSlice<'b>> {
    slices.clear();
    slices.into_iter().filter_map(|_| None).collect()
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;
