//! Single-resolution tasks with chained continuations.
//!
//! A [`Task`] resolves exactly once to a [`TaskOutcome`]: succeeded, faulted
//! or cancelled. Its producer side is a [`TaskCompletionSource`], created
//! together with the task by [`channel`]. One continuation may be attached
//! per task; it runs after resolution, on the thread that resolved the task
//! (or immediately, if the task was already resolved when the continuation
//! was attached). Continuations return new tasks, so chains are built by
//! value:
//!
//! ```
//! use imagepipe::task::{Task, TaskOutcome};
//!
//! let doubled = Task::succeeded(21).continue_with(|outcome| match outcome {
//!     TaskOutcome::Succeeded(v) => TaskOutcome::Succeeded(v * 2),
//!     TaskOutcome::Faulted(e) => TaskOutcome::Faulted(e),
//!     TaskOutcome::Cancelled => TaskOutcome::Cancelled,
//! });
//! assert!(matches!(doubled.try_take(), Some(TaskOutcome::Succeeded(42))));
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Cause carried by a faulted task.
pub type FaultCause = Arc<dyn std::error::Error + Send + Sync>;

/// Errors the task machinery itself produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The completion source was dropped without resolving its task.
    #[error("task abandoned before resolution")]
    Abandoned,
}

/// Resolution of a task.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Succeeded(T),
    Faulted(FaultCause),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, TaskOutcome::Faulted(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    /// Wraps a concrete error as a fault.
    pub fn fault<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskOutcome::Faulted(Arc::new(error))
    }
}

type Continuation<T> = Box<dyn FnOnce(TaskOutcome<T>) + Send>;

enum State<T> {
    Pending(Option<Continuation<T>>),
    Resolved(TaskOutcome<T>),
    /// The outcome was handed to a continuation or taken.
    Consumed,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

/// Consumer side of a single-resolution result.
pub struct Task<T> {
    shared: Arc<Shared<T>>,
}

/// Producer side of a [`Task`].
///
/// Dropping a source that never resolved its task faults the task with
/// [`TaskError::Abandoned`], so a continuation is never left waiting.
pub struct TaskCompletionSource<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a pending task and its completion source.
pub fn channel<T: Send + 'static>() -> (TaskCompletionSource<T>, Task<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending(None)),
    });
    (
        TaskCompletionSource {
            shared: Arc::clone(&shared),
        },
        Task { shared },
    )
}

impl<T: Send + 'static> TaskCompletionSource<T> {
    pub fn try_set_result(&self, value: T) -> bool {
        self.try_set_outcome(TaskOutcome::Succeeded(value))
    }

    pub fn try_set_error(&self, cause: FaultCause) -> bool {
        self.try_set_outcome(TaskOutcome::Faulted(cause))
    }

    pub fn try_set_cancelled(&self) -> bool {
        self.try_set_outcome(TaskOutcome::Cancelled)
    }

    /// Resolves the task; returns `false` if it was already resolved.
    pub fn try_set_outcome(&self, outcome: TaskOutcome<T>) -> bool {
        let continuation = {
            let mut state = self.shared.state.lock();
            let State::Pending(slot) = &mut *state else {
                return false;
            };
            match slot.take() {
                Some(continuation) => {
                    *state = State::Consumed;
                    continuation
                }
                None => {
                    *state = State::Resolved(outcome);
                    return true;
                }
            }
        };
        continuation(outcome);
        true
    }
}

impl<T> Drop for TaskCompletionSource<T> {
    fn drop(&mut self) {
        let continuation = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending(continuation) => {
                    let continuation = continuation.take();
                    if continuation.is_some() {
                        *state = State::Consumed;
                    } else {
                        *state = State::Resolved(TaskOutcome::fault(TaskError::Abandoned));
                    }
                    continuation
                }
                State::Resolved(_) | State::Consumed => None,
            }
        };
        if let Some(continuation) = continuation {
            continuation(TaskOutcome::fault(TaskError::Abandoned));
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// An already-succeeded task.
    pub fn succeeded(value: T) -> Self {
        Self::from_outcome(TaskOutcome::Succeeded(value))
    }

    /// An already-faulted task.
    pub fn faulted(cause: FaultCause) -> Self {
        Self::from_outcome(TaskOutcome::Faulted(cause))
    }

    /// An already-cancelled task.
    pub fn cancelled() -> Self {
        Self::from_outcome(TaskOutcome::Cancelled)
    }

    pub fn from_outcome(outcome: TaskOutcome<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Resolved(outcome)),
            }),
        }
    }

    /// Runs `future` on `runtime` and resolves the task with its output.
    pub fn spawn<F>(runtime: &tokio::runtime::Handle, future: F) -> Self
    where
        F: Future<Output = TaskOutcome<T>> + Send + 'static,
    {
        let (source, task) = channel();
        runtime.spawn(async move {
            let outcome = future.await;
            source.try_set_outcome(outcome);
        });
        task
    }

    /// Returns `true` once the task has an outcome (or it was consumed).
    pub fn is_resolved(&self) -> bool {
        !matches!(*self.shared.state.lock(), State::Pending(_))
    }

    /// Takes the outcome if the task has already resolved.
    pub fn try_take(self) -> Option<TaskOutcome<T>> {
        let mut state = self.shared.state.lock();
        match std::mem::replace(&mut *state, State::Consumed) {
            State::Resolved(outcome) => Some(outcome),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Attaches the terminal continuation of this task.
    pub fn when_resolved<F>(self, f: F)
    where
        F: FnOnce(TaskOutcome<T>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if let State::Pending(slot) = &mut *state {
            *slot = Some(Box::new(f));
            return;
        }
        let previous = std::mem::replace(&mut *state, State::Consumed);
        drop(state);
        if let State::Resolved(outcome) = previous {
            f(outcome);
        }
    }

    /// Chains a continuation mapping this task's outcome to a new outcome.
    pub fn continue_with<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(TaskOutcome<T>) -> TaskOutcome<U> + Send + 'static,
    {
        let (source, task) = channel();
        self.when_resolved(move |outcome| {
            source.try_set_outcome(f(outcome));
        });
        task
    }

    /// Chains a continuation that itself starts another task.
    ///
    /// The returned task resolves when the inner task does.
    pub fn continue_with_task<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(TaskOutcome<T>) -> Task<U> + Send + 'static,
    {
        let (source, task) = channel();
        self.when_resolved(move |outcome| {
            f(outcome).when_resolved(move |inner| {
                source.try_set_outcome(inner);
            });
        });
        task
    }

    /// Waits asynchronously for the outcome.
    pub async fn wait(self) -> TaskOutcome<T> {
        let (tx, rx) = oneshot::channel();
        self.when_resolved(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await
            .unwrap_or_else(|_| TaskOutcome::fault(TaskError::Abandoned))
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.shared.state.lock() {
            State::Pending(_) => "pending",
            State::Resolved(TaskOutcome::Succeeded(_)) => "succeeded",
            State::Resolved(TaskOutcome::Faulted(_)) => "faulted",
            State::Resolved(TaskOutcome::Cancelled) => "cancelled",
            State::Consumed => "consumed",
        };
        f.debug_struct("Task").field("state", &state).finish()
    }
}
