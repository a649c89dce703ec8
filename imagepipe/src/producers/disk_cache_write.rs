//! Disk cache write stage.

use super::context::ProducerContext;
use super::contract::{BoxConsumer, Consumer, Producer, Status};
use super::error::PipelineError;
use super::request::{CacheChoice, RequestLevel};
use crate::cache::{BufferedDiskCache, CacheKey, CacheKeyFactory, CacheTiers};
use crate::encoded::{EncodedImage, ImageFormat};
use std::sync::Arc;
use tracing::debug;

pub const DISK_CACHE_WRITE_PRODUCER_NAME: &str = "DiskCacheWriteProducer";

/// Writes final upstream results into a disk cache tier.
///
/// With a zero force-small threshold the request's cache choice picks the
/// tier. Otherwise images smaller than the threshold go to the small tier
/// and everything else to the default tier.
///
/// Writes are fire-and-forget; the result is forwarded downstream without
/// waiting for them. Intermediate results and images of unknown format are
/// forwarded unwritten.
pub struct DiskCacheWriteProducer {
    tiers: CacheTiers,
    key_factory: Arc<dyn CacheKeyFactory>,
    input: Arc<dyn Producer<EncodedImage>>,
    force_small_cache_threshold: usize,
}

impl DiskCacheWriteProducer {
    /// Creates the stage.
    ///
    /// # Arguments
    ///
    /// * `tiers` - Small and default disk cache tiers
    /// * `key_factory` - Derives cache keys from requests
    /// * `input` - Producer whose results are written
    /// * `force_small_cache_threshold` - Size below which images go to the
    ///   small tier; `0` routes by cache choice
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
}

/// Tier an image of `size` bytes is written to.
fn select_tier(
    tiers: &CacheTiers,
    choice: CacheChoice,
    force_small_cache_threshold: usize,
    size: usize,
) -> &BufferedDiskCache {
    if force_small_cache_threshold == 0 {
        tiers.for_choice(choice)
    } else if size < force_small_cache_threshold {
        &tiers.small
    } else {
        &tiers.default
    }
}

impl Producer<EncodedImage> for DiskCacheWriteProducer {
    fn produce_results(
        &self,
        mut consumer: BoxConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        let id = context.id();
        let listener = Arc::clone(context.listener());
        listener.on_producer_start(id, DISK_CACHE_WRITE_PRODUCER_NAME);

        if context.lowest_permitted_request_level() >= RequestLevel::DiskCache {
            listener.on_producer_finish_with_success(id, DISK_CACHE_WRITE_PRODUCER_NAME, None);
            consumer.on_new_result(None, Status::Last);
            return;
        }

        let request = context.request();
        if request.is_disk_cache_enabled() {
            consumer = Box::new(DiskCacheWriteConsumer {
                inner: consumer,
                tiers: self.tiers.clone(),
                choice: request.cache_choice(),
                force_small_cache_threshold: self.force_small_cache_threshold,
                key: self.key_factory.encoded_cache_key(request),
            });
        }
        listener.on_producer_finish_with_success(id, DISK_CACHE_WRITE_PRODUCER_NAME, None);
        self.input.produce_results(consumer, context);
    }

    fn name(&self) -> &'static str {
        DISK_CACHE_WRITE_PRODUCER_NAME
    }
}

struct DiskCacheWriteConsumer {
    inner: BoxConsumer<EncodedImage>,
    tiers: CacheTiers,
    choice: CacheChoice,
    force_small_cache_threshold: usize,
    key: CacheKey,
}

impl Consumer<EncodedImage> for DiskCacheWriteConsumer {
    fn on_new_result(&mut self, result: Option<&EncodedImage>, status: Status) {
        if let Some(image) = result.filter(|image| {
            status.is_last() && image.format() != ImageFormat::Unknown
        }) {
            let cache = select_tier(
                &self.tiers,
                self.choice,
                self.force_small_cache_threshold,
                image.size(),
            );
            debug!(tier = cache.name(), key = %self.key, size = image.size(), "Queueing disk cache write");
            // Completion is observed through the tier's stats.
            drop(cache.put(&self.key, image));
        }
        self.inner.on_new_result(result, status);
    }

    fn on_failure(&mut self, error: PipelineError) {
        self.inner.on_failure(error);
    }

    fn on_cancellation(&mut self) {
        self.inner.on_cancellation();
    }

    fn on_progress_update(&mut self, progress: f32) {
        self.inner.on_progress_update(progress);
    }
}
