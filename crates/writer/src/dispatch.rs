//! Where flush loops run
//!
//! `spawn` hands the flush loop to a [`Dispatch`] as a boxed future. The
//! default is [`TokioDispatch`], which spawns it on a tokio runtime; any
//! `Fn(FlushTask)` closure works too, so a loop can be routed into a custom
//! executor or a bounded worker pool.
//!
//! Writers built in manual mode never touch a dispatcher: the caller owns
//! the [`FlushLoop`](crate::FlushLoop) and decides where it runs.

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;

use crate::error::ConfigError;

/// A flush loop ready to run; completes when the writer has stopped
pub type FlushTask = BoxFuture<'static, ()>;

/// Runs flush loops
pub trait Dispatch: Send + Sync {
    /// Start `task`; it must be polled to completion
    fn dispatch(&self, task: FlushTask);
}

impl<F> Dispatch for F
where
    F: Fn(FlushTask) + Send + Sync,
{
    fn dispatch(&self, task: FlushTask) {
        self(task)
    }
}

/// Spawns flush loops as tokio tasks
#[derive(Debug, Clone)]
pub struct TokioDispatch {
    handle: Handle,
}

impl TokioDispatch {
    /// Spawn onto the runtime behind `handle`
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawn onto the runtime the caller is running in
    pub fn current() -> Result<Self, ConfigError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ConfigError::NoRuntime)
    }
}

impl Dispatch for TokioDispatch {
    fn dispatch(&self, task: FlushTask) {
        // Detached: the writer observes completion through its done signal
        drop(self.handle.spawn(task));
    }
}
