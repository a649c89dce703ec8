//! Reusable consumers.

use super::contract::{BoxConsumer, Consumer, Status};
use super::error::PipelineError;
use crate::encoded::EncodedImage;
use crate::references::{Handle, HandleError};
use tokio::sync::oneshot;
use tracing::debug;

/// Takes an owned reference to a lent result.
pub trait CloneableResult: Sized {
    fn clone_result(&self) -> Result<Self, HandleError>;
}

impl CloneableResult for EncodedImage {
    fn clone_result(&self) -> Result<Self, HandleError> {
        self.try_clone()
    }
}

impl<T> CloneableResult for Handle<T> {
    fn clone_result(&self) -> Result<Self, HandleError> {
        self.try_clone()
    }
}

/// Enforces the single-terminal rule on the consumer it wraps.
///
/// Anything delivered after a terminal callback is dropped. Progress is
/// clamped to `[0, 1]`; `NaN` progress is dropped.
pub struct BaseConsumer<T> {
    inner: BoxConsumer<T>,
    finished: bool,
}

impl<T: 'static> BaseConsumer<T> {
    pub fn new(inner: BoxConsumer<T>) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    pub fn boxed(inner: BoxConsumer<T>) -> BoxConsumer<T> {
        Box::new(Self::new(inner))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn accept(&mut self, callback: &'static str) -> bool {
        if self.finished {
            debug!(callback, "Dropping callback delivered after terminal result");
            return false;
        }
        true
    }
}

impl<T: 'static> Consumer<T> for BaseConsumer<T> {
    fn on_new_result(&mut self, result: Option<&T>, status: Status) {
        if !self.accept("on_new_result") {
            return;
        }
        self.finished = status.is_last();
        self.inner.on_new_result(result, status);
    }

    fn on_failure(&mut self, error: PipelineError) {
        if !self.accept("on_failure") {
            return;
        }
        self.finished = true;
        self.inner.on_failure(error);
    }

    fn on_cancellation(&mut self) {
        if !self.accept("on_cancellation") {
            return;
        }
        self.finished = true;
        self.inner.on_cancellation();
    }

    fn on_progress_update(&mut self, progress: f32) {
        if progress.is_nan() || !self.accept("on_progress_update") {
            return;
        }
        self.inner.on_progress_update(progress.clamp(0.0, 1.0));
    }
}

/// Terminal state of a request as seen by its caller.
#[derive(Debug)]
pub enum RequestOutcome<T> {
    /// The final result; `None` when the request was satisfied without one.
    Completed(Option<T>),
    Failed(PipelineError),
    Cancelled,
}

impl<T> RequestOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RequestOutcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestOutcome::Cancelled)
    }
}

/// Sends the terminal outcome of a request into a oneshot channel.
pub struct ChannelConsumer<T> {
    sender: Option<oneshot::Sender<RequestOutcome<T>>>,
}

impl<T: CloneableResult + Send + 'static> ChannelConsumer<T> {
    pub fn create() -> (Self, oneshot::Receiver<RequestOutcome<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self { sender: Some(tx) }, rx)
    }

    fn finish(&mut self, outcome: RequestOutcome<T>) {
        if let Some(sender) = self.sender.take() {
            // Receiver may already be gone.
            let _ = sender.send(outcome);
        }
    }
}

impl<T: CloneableResult + Send + 'static> Consumer<T> for ChannelConsumer<T> {
    fn on_new_result(&mut self, result: Option<&T>, status: Status) {
        if !status.is_last() {
            return;
        }
        let outcome = match result.map(CloneableResult::clone_result).transpose() {
            Ok(value) => RequestOutcome::Completed(value),
            Err(e) => RequestOutcome::Failed(e.into()),
        };
        self.finish(outcome);
    }

    fn on_failure(&mut self, error: PipelineError) {
        self.finish(RequestOutcome::Failed(error));
    }

    fn on_cancellation(&mut self) {
        self.finish(RequestOutcome::Cancelled);
    }
}
