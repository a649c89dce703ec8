//! The producer/consumer contract.

use super::context::ProducerContext;
use super::error::PipelineError;
use std::sync::Arc;

/// Whether a delivered result is the last one for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Intermediate,
    Last,
}

impl Status {
    pub fn is_last(&self) -> bool {
        matches!(self, Status::Last)
    }
}

/// Receives the results of one request.
///
/// A consumer sees zero or more intermediate results and progress updates,
/// then exactly one terminal call: a [`Status::Last`] result, a failure, or
/// a cancellation.
///
/// Results are lent for the duration of the call. A consumer that keeps a
/// result must take its own reference (see
/// [`CloneableResult`](super::CloneableResult)).
pub trait Consumer<T>: Send {
    fn on_new_result(&mut self, result: Option<&T>, status: Status);

    fn on_failure(&mut self, error: PipelineError);

    fn on_cancellation(&mut self);

    /// Progress in `[0, 1]`.
    fn on_progress_update(&mut self, _progress: f32) {}
}

pub type BoxConsumer<T> = Box<dyn Consumer<T>>;

/// One stage of a pipeline.
///
/// Stages compose by wrapping an input producer and consuming its results.
pub trait Producer<T>: Send + Sync {
    /// Starts producing results for `context` into `consumer`.
    ///
    /// May return before any callback has been delivered.
    fn produce_results(&self, consumer: BoxConsumer<T>, context: Arc<ProducerContext>);

    /// Stage name reported to listeners.
    fn name(&self) -> &'static str;
}
