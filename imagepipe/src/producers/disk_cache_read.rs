//! Disk cache read stage.
//!
//! Looks the request's encoded cache key up in the disk tiers and falls
//! through to its input on a miss. With a non-zero force-small threshold
//! both tiers are consulted:
//!
//! 1. Check membership of both tiers synchronously.
//! 2. Query the small tier first if the key is resident there or absent
//!    from the default tier; otherwise query the default tier first.
//! 3. On a clean hit deliver it. On a miss or read fault query the other
//!    tier.
//!
//! Read faults are reported to the listener and treated as misses. The
//! input producer is started at most once per request.

use super::context::ProducerContext;
use super::contract::{BoxConsumer, Producer, Status};
use super::listener::{ExtraMap, ProducerListener};
use super::request::RequestLevel;
use crate::cache::{BufferedDiskCache, CacheKey, CacheKeyFactory, CacheTiers};
use crate::encoded::EncodedImage;
use crate::task::{Task, TaskOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DISK_CACHE_PRODUCER_NAME: &str = "DiskCacheProducer";

/// Extra map key reporting whether the lookup hit.
pub const EXTRA_CACHED_VALUE_FOUND: &str = "cached_value_found";

/// Listener event emitted when the first tier of a tiered lookup faults.
pub const EVENT_FIRST_TIER_READ_FAILED: &str = "first_tier_read_failed";

pub struct DiskCacheReadProducer {
    tiers: CacheTiers,
    key_factory: Arc<dyn CacheKeyFactory>,
    input: Arc<dyn Producer<EncodedImage>>,
    force_small_cache_threshold: usize,
}

impl DiskCacheReadProducer {
    /// Creates the stage.
    ///
    /// # Arguments
    ///
    /// * `tiers` - Small and default disk cache tiers
    /// * `key_factory` - Derives cache keys from requests
    /// * `input` - Producer started on a miss
    /// * `force_small_cache_threshold` - `0` disables tiered lookup
    pub fn new(
        tiers: CacheTiers,
        key_factory: Arc<dyn CacheKeyFactory>,
        input: Arc<dyn Producer<EncodedImage>>,
        force_small_cache_threshold: usize,
    ) -> Self {
        Self {
            tiers,
            key_factory,
            input,
            force_small_cache_threshold,
        }
    }

    fn is_tiered(&self) -> bool {
        self.force_small_cache_threshold > 0
    }

    fn maybe_start_input_producer(
        &self,
        mut consumer: BoxConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        if context.lowest_permitted_request_level() >= RequestLevel::DiskCache {
            consumer.on_new_result(None, Status::Last);
        } else {
            self.input.produce_results(consumer, context);
        }
    }

    fn tiered_lookup(
        &self,
        key: &CacheKey,
        is_cancelled: &Arc<AtomicBool>,
        context: &Arc<ProducerContext>,
    ) -> Task<Option<EncodedImage>> {
        let in_small = self.tiers.small.contains_sync(key);
        let in_default = self.tiers.default.contains_sync(key);
        let (first, second) = if in_small || !in_default {
            (&self.tiers.small, &self.tiers.default)
        } else {
            (&self.tiers.default, &self.tiers.small)
        };
        debug!(
            request_id = %context.id(),
            key = %key,
            in_small,
            in_default,
            first = first.name(),
            "Starting tiered disk cache lookup"
        );

        let second: BufferedDiskCache = second.clone();
        let key2 = key.clone();
        let flag = Arc::clone(is_cancelled);
        let context = Arc::clone(context);
        first
            .get(key, Arc::clone(is_cancelled))
            .continue_with_task(move |outcome| match outcome {
                TaskOutcome::Succeeded(Some(image)) => Task::succeeded(Some(image)),
                TaskOutcome::Cancelled => Task::cancelled(),
                TaskOutcome::Succeeded(None) => second.get(&key2, flag),
                TaskOutcome::Faulted(cause) => {
                    warn!(
                        request_id = %context.id(),
                        key = %key2,
                        error = %cause,
                        "First disk cache tier failed, trying the other tier"
                    );
                    context.listener().on_producer_event(
                        context.id(),
                        DISK_CACHE_PRODUCER_NAME,
                        EVENT_FIRST_TIER_READ_FAILED,
                    );
                    second.get(&key2, flag)
                }
            })
    }
}

impl Producer<EncodedImage> for DiskCacheReadProducer {
    fn produce_results(
        &self,
        consumer: BoxConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        if !context.request().is_disk_cache_enabled() {
            self.maybe_start_input_producer(consumer, context);
            return;
        }

        context
            .listener()
            .on_producer_start(context.id(), DISK_CACHE_PRODUCER_NAME);

        let key = self.key_factory.encoded_cache_key(context.request());
        let is_cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&is_cancelled);
        context.add_cancellation_callback(move || flag.store(true, Ordering::SeqCst));

        let lookup = if self.is_tiered() {
            self.tiered_lookup(&key, &is_cancelled, &context)
        } else {
            self.tiers
                .for_choice(context.request().cache_choice())
                .get(&key, Arc::clone(&is_cancelled))
        };

        let input = Arc::clone(&self.input);
        lookup.when_resolved(move |outcome| {
            on_finish_disk_reads(outcome, consumer, context, input, &is_cancelled);
        });
    }

    fn name(&self) -> &'static str {
        DISK_CACHE_PRODUCER_NAME
    }
}

fn on_finish_disk_reads(
    outcome: TaskOutcome<Option<EncodedImage>>,
    mut consumer: BoxConsumer<EncodedImage>,
    context: Arc<ProducerContext>,
    input: Arc<dyn Producer<EncodedImage>>,
    is_cancelled: &AtomicBool,
) {
    let id = context.id();
    let listener = Arc::clone(context.listener());

    let outcome = if is_cancelled.load(Ordering::SeqCst) {
        TaskOutcome::Cancelled
    } else {
        outcome
    };

    match outcome {
        TaskOutcome::Cancelled => {
            listener.on_producer_finish_with_cancellation(id, DISK_CACHE_PRODUCER_NAME, None);
            consumer.on_cancellation();
        }
        TaskOutcome::Succeeded(Some(image)) => {
            let extra = extra_map(listener.as_ref(), &context, true);
            listener.on_producer_finish_with_success(id, DISK_CACHE_PRODUCER_NAME, extra.as_ref());
            consumer.on_progress_update(1.0);
            consumer.on_new_result(Some(&image), Status::Last);
            drop(image);
        }
        TaskOutcome::Succeeded(None) => {
            let extra = extra_map(listener.as_ref(), &context, false);
            listener.on_producer_finish_with_success(id, DISK_CACHE_PRODUCER_NAME, extra.as_ref());
            input.produce_results(consumer, context);
        }
        TaskOutcome::Faulted(cause) => {
            listener.on_producer_finish_with_failure(
                id,
                DISK_CACHE_PRODUCER_NAME,
                cause.as_ref(),
                None,
            );
            input.produce_results(consumer, context);
        }
    }
}

fn extra_map(
    listener: &dyn ProducerListener,
    context: &ProducerContext,
    found: bool,
) -> Option<ExtraMap> {
    listener
        .requires_extra_map(context.id())
        .then(|| ExtraMap::from([(EXTRA_CACHED_VALUE_FOUND, found.to_string())]))
}
