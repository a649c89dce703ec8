//! Observation hooks for producer stages.

use super::context::RequestId;
use std::collections::BTreeMap;
use std::error::Error;
use tracing::{debug, trace, warn};

/// Stage-specific key/value details reported on completion.
pub type ExtraMap = BTreeMap<&'static str, String>;

/// Receives lifecycle events from every stage a request passes through.
///
/// Each stage that reports a start reports exactly one finish (success,
/// failure or cancellation) for the same request.
pub trait ProducerListener: Send + Sync {
    fn on_producer_start(&self, request_id: RequestId, producer: &str);

    /// Intermediate, stage-defined event.
    fn on_producer_event(&self, _request_id: RequestId, _producer: &str, _event: &str) {}

    fn on_producer_finish_with_success(
        &self,
        request_id: RequestId,
        producer: &str,
        extra_map: Option<&ExtraMap>,
    );

    fn on_producer_finish_with_failure(
        &self,
        request_id: RequestId,
        producer: &str,
        error: &dyn Error,
        extra_map: Option<&ExtraMap>,
    );

    fn on_producer_finish_with_cancellation(
        &self,
        request_id: RequestId,
        producer: &str,
        extra_map: Option<&ExtraMap>,
    );

    /// Whether stages should bother building an [`ExtraMap`].
    fn requires_extra_map(&self, request_id: RequestId) -> bool;
}

/// Listener that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

fn render(extra_map: Option<&ExtraMap>) -> String {
    extra_map
        .map(|m| format!("{:?}", m))
        .unwrap_or_default()
}

impl ProducerListener for TracingListener {
    fn on_producer_start(&self, request_id: RequestId, producer: &str) {
        trace!(%request_id, producer, "Producer started");
    }

    fn on_producer_event(&self, request_id: RequestId, producer: &str, event: &str) {
        debug!(%request_id, producer, event, "Producer event");
    }

    fn on_producer_finish_with_success(
        &self,
        request_id: RequestId,
        producer: &str,
        extra_map: Option<&ExtraMap>,
    ) {
        debug!(%request_id, producer, extra = %render(extra_map), "Producer succeeded");
    }

    fn on_producer_finish_with_failure(
        &self,
        request_id: RequestId,
        producer: &str,
        error: &dyn Error,
        extra_map: Option<&ExtraMap>,
    ) {
        warn!(%request_id, producer, error = %error, extra = %render(extra_map), "Producer failed");
    }

    fn on_producer_finish_with_cancellation(
        &self,
        request_id: RequestId,
        producer: &str,
        extra_map: Option<&ExtraMap>,
    ) {
        debug!(%request_id, producer, extra = %render(extra_map), "Producer cancelled");
    }

    fn requires_extra_map(&self, _request_id: RequestId) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpListener;

impl ProducerListener for NoOpListener {
    fn on_producer_start(&self, _request_id: RequestId, _producer: &str) {}

    fn on_producer_finish_with_success(
        &self,
        _request_id: RequestId,
        _producer: &str,
        _extra_map: Option<&ExtraMap>,
    ) {
    }

    fn on_producer_finish_with_failure(
        &self,
        _request_id: RequestId,
        _producer: &str,
        _error: &dyn Error,
        _extra_map: Option<&ExtraMap>,
    ) {
    }

    fn on_producer_finish_with_cancellation(
        &self,
        _request_id: RequestId,
        _producer: &str,
        _extra_map: Option<&ExtraMap>,
    ) {
    }

    fn requires_extra_map(&self, _request_id: RequestId) -> bool {
        false
    }
}
