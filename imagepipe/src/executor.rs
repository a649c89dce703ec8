//! Executor seam for running blocking work off the async runtime.
//!
//! Stages that read files or decode bitmaps depend on [`BlockingExecutor`]
//! rather than on tokio directly, so tests can run them inline with
//! [`SyncExecutor`].
//!
//! ```text
//! ┌─────────────────────┐
//! │  Producer stages    │  (local fetch, decode)
//! └─────────┬───────────┘
//!           │ depends on
//!           ▼
//! ┌─────────────────────┐
//! │  BlockingExecutor   │
//! └─────────┬───────────┘
//!           │ implemented by
//!           ▼
//! ┌─────────────────────┐
//! │  TokioExecutor      │  spawn_blocking on a runtime handle
//! │  SyncExecutor       │  runs on the calling thread
//! └─────────────────────┘
//! ```

use tokio::runtime::Handle as RuntimeHandle;

/// Runs blocking (CPU- or IO-bound) closures.
///
/// Results travel back through the closure itself; stages report them to
/// their consumer from inside the closure.
pub trait BlockingExecutor: Send + Sync + 'static {
    /// Starts `f` without waiting for it.
    fn spawn_blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static;
}

/// Tokio-based implementation.
///
/// Holds a runtime handle so work can be submitted from threads outside the
/// runtime, such as a caller cancelling a request.
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    runtime: RuntimeHandle,
}

impl TokioExecutor {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self { runtime }
    }
}

impl BlockingExecutor for TokioExecutor {
    fn spawn_blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.runtime.spawn_blocking(f));
    }
}

/// Synchronous executor.
///
/// Executes "blocking" work immediately on the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncExecutor;

impl BlockingExecutor for SyncExecutor {
    fn spawn_blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        f();
    }
}
