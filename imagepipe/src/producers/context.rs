//! Per-request state shared by every stage of a chain.

use super::listener::ProducerListener;
use super::request::{ImageRequest, RequestLevel};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Global counter for generating unique request IDs.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a request.
///
/// IDs are monotonically increasing and unique within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a new unique request ID.
    pub fn new() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

type CancellationCallback = Box<dyn FnOnce() + Send>;

/// Request context handed to every producer in a chain.
///
/// Cancellation is write-once: [`ProducerContext::cancel`] flips the flag and
/// runs every registered callback exactly once. Callbacks registered after
/// cancellation run immediately on the registering thread.
pub struct ProducerContext {
    id: RequestId,
    request: ImageRequest,
    listener: Arc<dyn ProducerListener>,
    token: CancellationToken,
    /// `None` once cancelled.
    callbacks: Mutex<Option<Vec<CancellationCallback>>>,
}

impl ProducerContext {
    pub fn new(request: ImageRequest, listener: Arc<dyn ProducerListener>) -> Arc<Self> {
        Arc::new(Self {
            id: RequestId::new(),
            request,
            listener,
            token: CancellationToken::new(),
            callbacks: Mutex::new(Some(Vec::new())),
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request(&self) -> &ImageRequest {
        &self.request
    }

    pub fn listener(&self) -> &Arc<dyn ProducerListener> {
        &self.listener
    }

    pub fn lowest_permitted_request_level(&self) -> RequestLevel {
        self.request.lowest_permitted_request_level()
    }

    /// Requests cancellation. Returns `false` if it was already requested.
    pub fn cancel(&self) -> bool {
        let callbacks = match self.callbacks.lock().take() {
            Some(callbacks) => callbacks,
            None => return false,
        };
        self.token.cancel();
        debug!(request_id = %self.id, callbacks = callbacks.len(), "Request cancelled");
        for callback in callbacks {
            callback();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Token that is cancelled together with this context.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Registers a callback to run once, when cancellation is requested.
    pub fn add_cancellation_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.callbacks.lock();
        if let Some(pending) = callbacks.as_mut() {
            pending.push(Box::new(callback));
            return;
        }
        drop(callbacks);
        callback();
    }
}

impl std::fmt::Debug for ProducerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerContext")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::NoOpListener;
    use std::sync::atomic::AtomicUsize;

    fn context() -> Arc<ProducerContext> {
        ProducerContext::new(ImageRequest::new("data:,x"), Arc::new(NoOpListener))
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert!(b > a);
        assert!(a.to_string().starts_with("req-"));
    }

    #[test]
    fn test_callbacks_run_once_on_cancel() {
        let ctx = context();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            ctx.add_cancellation_callback(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(!ctx.is_cancelled());
        assert!(ctx.cancel());
        assert!(!ctx.cancel());
        assert!(ctx.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_callback_after_cancel_runs_immediately() {
        let ctx = context();
        ctx.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&calls);
        ctx.add_cancellation_callback(move || {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_touch_context() {
        let ctx = context();
        let inner = Arc::clone(&ctx);
        let observed = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&observed);
        ctx.add_cancellation_callback(move || {
            if inner.is_cancelled() {
                sink.fetch_add(1, Ordering::SeqCst);
            }
            inner.add_cancellation_callback(|| {});
        });
        ctx.cancel();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let ctx = context();
        let waiter = Arc::clone(&ctx);
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        ctx.cancel();
        handle.await.unwrap();
    }
}
