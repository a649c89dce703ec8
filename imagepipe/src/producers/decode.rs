//! Decode stage: encoded images in, admitted bitmaps out.

use super::context::ProducerContext;
use super::contract::{BoxConsumer, Consumer, Producer, Status};
use super::error::PipelineError;
use super::listener::ExtraMap;
use crate::decoder::{DecodedImage, PurgeableDecoder};
use crate::encoded::EncodedImage;
use crate::executor::BlockingExecutor;
use crate::references::Handle;
use std::sync::Arc;
use tracing::debug;

pub const DECODE_PRODUCER_NAME: &str = "DecodeProducer";

pub const EXTRA_BITMAP_SIZE: &str = "bitmap_size";
pub const EXTRA_IMAGE_FORMAT: &str = "image_format";

/// Decodes the final encoded result of its input on a blocking executor.
///
/// Intermediate encoded results are not decoded.
pub struct DecodeProducer<X> {
    decoder: Arc<PurgeableDecoder>,
    executor: Arc<X>,
    input: Arc<dyn Producer<EncodedImage>>,
}

impl<X: BlockingExecutor> DecodeProducer<X> {
    pub fn new(
        decoder: Arc<PurgeableDecoder>,
        executor: Arc<X>,
        input: Arc<dyn Producer<EncodedImage>>,
    ) -> Self {
        Self {
            decoder,
            executor,
            input,
        }
    }
}

impl<X: BlockingExecutor> Producer<Handle<DecodedImage>> for DecodeProducer<X> {
    fn produce_results(
        &self,
        consumer: BoxConsumer<Handle<DecodedImage>>,
        context: Arc<ProducerContext>,
    ) {
        let decode = DecodeConsumer {
            inner: Some(consumer),
            decoder: Arc::clone(&self.decoder),
            executor: Arc::clone(&self.executor),
            context: Arc::clone(&context),
        };
        self.input.produce_results(Box::new(decode), context);
    }

    fn name(&self) -> &'static str {
        DECODE_PRODUCER_NAME
    }
}

struct DecodeConsumer<X> {
    /// Taken once the final result has been handed to the executor.
    inner: Option<BoxConsumer<Handle<DecodedImage>>>,
    decoder: Arc<PurgeableDecoder>,
    executor: Arc<X>,
    context: Arc<ProducerContext>,
}

impl<X: BlockingExecutor> DecodeConsumer<X> {
    fn schedule_decode(&mut self, image: &EncodedImage) {
        let Some(mut inner) = self.inner.take() else {
            return;
        };
        let context = Arc::clone(&self.context);
        let id = context.id();
        context.listener().on_producer_start(id, DECODE_PRODUCER_NAME);

        let image = match image.try_clone() {
            Ok(image) => image,
            Err(e) => {
                let error = PipelineError::from(e);
                context
                    .listener()
                    .on_producer_finish_with_failure(id, DECODE_PRODUCER_NAME, &error, None);
                inner.on_failure(error);
                return;
            }
        };

        let decoder = Arc::clone(&self.decoder);
        self.executor.spawn_blocking(move || {
            let listener = context.listener();
            if context.is_cancelled() {
                listener.on_producer_finish_with_cancellation(id, DECODE_PRODUCER_NAME, None);
                inner.on_cancellation();
                return;
            }

            let options = *context.request().decode_options();
            match decoder.decode(&image, &options) {
                Ok(decoded) => {
                    drop(image);
                    let extra = match decoded.get() {
                        Ok(bitmap) if listener.requires_extra_map(id) => Some(ExtraMap::from([
                            (
                                EXTRA_BITMAP_SIZE,
                                format!("{}x{}", bitmap.width(), bitmap.height()),
                            ),
                            (EXTRA_IMAGE_FORMAT, bitmap.format().to_string()),
                        ])),
                        _ => None,
                    };
                    debug!(request_id = %id, "Decoded image");
                    listener.on_producer_finish_with_success(id, DECODE_PRODUCER_NAME, extra.as_ref());
                    inner.on_progress_update(1.0);
                    inner.on_new_result(Some(&decoded), Status::Last);
                }
                Err(e) => {
                    let error = PipelineError::from(e);
                    listener.on_producer_finish_with_failure(id, DECODE_PRODUCER_NAME, &error, None);
                    inner.on_failure(error);
                }
            }
        });
    }
}

impl<X: BlockingExecutor> Consumer<EncodedImage> for DecodeConsumer<X> {
    fn on_new_result(&mut self, result: Option<&EncodedImage>, status: Status) {
        if !status.is_last() {
            return;
        }
        match result {
            Some(image) => self.schedule_decode(image),
            None => {
                if let Some(mut inner) = self.inner.take() {
                    inner.on_new_result(None, Status::Last);
                }
            }
        }
    }

    fn on_failure(&mut self, error: PipelineError) {
        if let Some(mut inner) = self.inner.take() {
            inner.on_failure(error);
        }
    }

    fn on_cancellation(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.on_cancellation();
        }
    }

    fn on_progress_update(&mut self, progress: f32) {
        if let Some(inner) = self.inner.as_mut() {
            inner.on_progress_update(progress);
        }
    }
}
