//! Tell - Writer
//!
//! Batching asynchronous writer: many concurrent producers, one serial sink.
//!
//! Producers hand byte payloads to a [`BatchWriter`] and return as soon as
//! the payload is queued. A single flush loop per writer collects payloads and
//! writes them to the sink in bulk, so producer latency is decoupled from sink
//! latency while memory stays bounded by the queue capacity.
//!
//! # Architecture
//!
//! ```text
//! [Producers] --write()--> [bounded queue] --> [FlushLoop] --> [SinkAdapter] --> [Sink]
//!      │                                           │
//!      └──── copy into pooled BytesMut ◀── release ┘
//! ```
//!
//! # Write modes
//!
//! | Mode | Flush | Loop runs on |
//! |------|-------|--------------|
//! | `coalesce` | payloads concatenated, one `write` per cycle | `Dispatch` |
//! | `vectored` | one `write_vectored` over the discrete buffers | `Dispatch` |
//! | `manual` | as `vectored` | caller (`build()` + `FlushLoop::run`) |
//!
//! A cycle is flushed when `max_flush_delay` has passed since its first
//! payload, when the queue runs dry (if `max_flush_delay` is zero), or when it
//! holds `max_in_flight` payloads.
//!
//! # Guarantees
//!
//! - Bytes reach the sink in enqueue order.
//! - `close` returns only after every payload accepted before it was flushed.
//! - A sink error is terminal: it is latched and returned by every later call.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tell_writer::{BatchWriter, WriterConfig};
//!
//! let file = tokio::fs::File::create("events.log").await?;
//! let config = WriterConfig::coalescing(Duration::from_millis(5))
//!     .with_name("events")
//!     .with_max_in_flight(4096);
//!
//! let writer = BatchWriter::spawn(file, config)?;
//! writer.write(b"{\"event\":\"page_view\"}\n").await?;
//! writer.close().await?;
//! ```

/// Lock-free pool of payload buffers
pub mod buffer_pool;

/// Writer configuration
pub mod config;

/// Flush-loop accumulation context and its pool
pub mod context;

/// Where flush loops run
pub mod dispatch;

/// Error types
pub mod error;

/// The single-consumer flush loop
pub mod flush;

/// Lock-free writer counters
pub mod metrics;

/// Rate-limited warning logging
pub mod rate_limited_logger;

/// Sink adapter: write path selection, deadlines, partial writes
pub mod sink;

/// Producer handle and builder
pub mod writer;

#[cfg(test)]
pub(crate) mod test_util;

pub use buffer_pool::{BufferPool, BufferPoolMetrics, PoolSnapshot};
pub use config::{WriteMode, WriterConfig};
pub use context::{ContextPool, FlushContext};
pub use dispatch::{Dispatch, FlushTask, TokioDispatch};
pub use error::{ConfigError, Result, WriterError};
pub use flush::FlushLoop;
pub use metrics::{MetricsSnapshot, WriterMetrics};
pub use rate_limited_logger::RateLimitedLogger;
pub use sink::{SinkAdapter, SinkFailure};
pub use writer::{BatchWriter, BatchWriterBuilder};
