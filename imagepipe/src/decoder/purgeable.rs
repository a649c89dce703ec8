//! Decoding through pooled scratch memory with bitmap admission.

use super::{DecodeError, DecodeOptions, DecodedImage, Decoder};
use crate::encoded::{is_complete_jpeg, EncodedImage, ImageFormat, JPEG_EOI};
use crate::memory::{report_release_violation, BitmapCounter, ByteArrayPool, PoolError};
use crate::references::Handle;
use std::sync::Arc;
use tracing::debug;

/// Decoder that stages encoded bytes in pooled memory and meters the
/// resulting bitmaps against a [`BitmapCounter`].
///
/// Every bitmap handed out is admitted first; its handle's releaser returns
/// the admission and recycles the bitmap.
pub struct PurgeableDecoder {
    decoder: Arc<dyn Decoder>,
    pool: Arc<ByteArrayPool>,
    counter: Arc<BitmapCounter>,
}

impl PurgeableDecoder {
    pub fn new(
        decoder: Arc<dyn Decoder>,
        pool: Arc<ByteArrayPool>,
        counter: Arc<BitmapCounter>,
    ) -> Self {
        Self {
            decoder,
            pool,
            counter,
        }
    }

    pub fn counter(&self) -> &Arc<BitmapCounter> {
        &self.counter
    }

    /// Decodes `image` into an admitted bitmap.
    ///
    /// An incomplete JPEG (one missing its trailing EOI marker) gets the
    /// marker appended before decoding. A bitmap that cannot be admitted is
    /// recycled before [`DecodeError::TooManyBitmaps`] is returned.
    pub fn decode(
        &self,
        image: &EncodedImage,
        options: &DecodeOptions,
    ) -> Result<Handle<DecodedImage>, DecodeError> {
        let bytes = image.bytes()?;
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        let len = bytes.len();

        let mut scratch = self.scratch_buffer(len + JPEG_EOI.len())?;
        let decode_len = {
            let buffer = scratch.as_mut_slice();
            buffer[..len].copy_from_slice(bytes);
            if image.format() == ImageFormat::Jpeg && !is_complete_jpeg(bytes) {
                buffer[len..len + JPEG_EOI.len()].copy_from_slice(&JPEG_EOI);
                len + JPEG_EOI.len()
            } else {
                len
            }
        };
        let mut scratch = scratch.into_handle();

        let decoded = match scratch.get() {
            Ok(buffer) => self.decoder.decode(&buffer[..decode_len], options),
            Err(e) => Err(e.into()),
        };
        scratch.close()?;
        let bitmap = decoded?;

        let size = bitmap.size_in_bytes();
        if let Err(rejected) = self.counter.try_admit(size) {
            debug!(
                size,
                count = self.counter.count(),
                total = self.counter.size(),
                "Bitmap rejected by admission counter"
            );
            bitmap.recycle();
            return Err(rejected.into());
        }

        let counter = Arc::clone(&self.counter);
        Ok(Handle::of(
            DecodedImage {
                bitmap,
                format: image.format(),
            },
            move |decoded: DecodedImage| {
                if let Err(e) = counter.release(decoded.size_in_bytes()) {
                    report_release_violation(&e);
                }
                decoded.bitmap.recycle();
            },
        ))
    }

    /// Pooled scratch memory; sizes beyond the largest bucket fall back to a
    /// plain allocation.
    fn scratch_buffer(&self, size: usize) -> Result<Scratch, PoolError> {
        match self.pool.get(size) {
            Ok(buffer) => Ok(Scratch::Pooled(buffer, Arc::clone(&self.pool))),
            Err(PoolError::NoBucket { .. }) => Ok(Scratch::Unpooled(vec![0u8; size])),
            Err(e) => Err(e),
        }
    }
}

enum Scratch {
    Pooled(Vec<u8>, Arc<ByteArrayPool>),
    Unpooled(Vec<u8>),
}

impl Scratch {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Scratch::Pooled(buffer, _) | Scratch::Unpooled(buffer) => buffer,
        }
    }

    fn into_handle(self) -> Handle<Vec<u8>> {
        match self {
            Scratch::Pooled(buffer, pool) => Handle::of(buffer, pool.releaser()),
            Scratch::Unpooled(buffer) => Handle::unpooled(buffer),
        }
    }
}

impl std::fmt::Debug for PurgeableDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeableDecoder")
            .field("pool", &self.pool)
            .field("counter", &self.counter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Bitmap, ImageCrateDecoder};
    use crate::encoded::PooledByteBufferFactory;
    use crate::memory::{AdmissionError, PoolParams};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeBitmap {
        size: usize,
        recycled: Arc<AtomicUsize>,
    }

    impl Bitmap for FakeBitmap {
        fn width(&self) -> u32 {
            1
        }

        fn height(&self) -> u32 {
            1
        }

        fn size_in_bytes(&self) -> usize {
            self.size
        }

        fn recycle(self: Box<Self>) {
            self.recycled.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records what it was asked to decode and returns bitmaps of a fixed size.
    struct FakeDecoder {
        bitmap_size: usize,
        recycled: Arc<AtomicUsize>,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl Decoder for FakeDecoder {
        fn decode(
            &self,
            bytes: &[u8],
            _options: &DecodeOptions,
        ) -> Result<Box<dyn Bitmap>, DecodeError> {
            self.seen.lock().push(bytes.to_vec());
            Ok(Box::new(FakeBitmap {
                size: self.bitmap_size,
                recycled: Arc::clone(&self.recycled),
            }))
        }
    }

    struct Fixture {
        decoder: Arc<FakeDecoder>,
        purgeable: PurgeableDecoder,
        pool: Arc<ByteArrayPool>,
        factory: PooledByteBufferFactory,
    }

    fn fixture(bitmap_size: usize, counter: BitmapCounter) -> Fixture {
        let pool = ByteArrayPool::new(PoolParams::new(vec![16, 64, 256], 4, 4096).unwrap());
        let decoder = Arc::new(FakeDecoder {
            bitmap_size,
            recycled: Arc::new(AtomicUsize::new(0)),
            seen: Mutex::new(Vec::new()),
        });
        let purgeable = PurgeableDecoder::new(
            decoder.clone(),
            Arc::clone(&pool),
            Arc::new(counter),
        );
        Fixture {
            decoder,
            purgeable,
            factory: PooledByteBufferFactory::new(Arc::clone(&pool)),
            pool,
        }
    }

    fn encoded(factory: &PooledByteBufferFactory, bytes: &[u8]) -> EncodedImage {
        EncodedImage::new(factory.new_byte_buffer(bytes).unwrap()).unwrap()
    }

    #[test]
    fn test_incomplete_jpeg_gets_eoi_appended() {
        let f = fixture(10, BitmapCounter::new(4, 100));
        let image = encoded(&f.factory, &[0xFF, 0xD8, 0xFF, 0xE0, 0x01]);

        let _decoded = f.purgeable.decode(&image, &DecodeOptions::default()).unwrap();
        assert_eq!(
            f.decoder.seen.lock()[0],
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x01, 0xFF, 0xD9]
        );
    }

    #[test]
    fn test_complete_jpeg_is_passed_through() {
        let f = fixture(10, BitmapCounter::new(4, 100));
        let bytes = [0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9];
        let image = encoded(&f.factory, &bytes);

        let _decoded = f.purgeable.decode(&image, &DecodeOptions::default()).unwrap();
        assert_eq!(f.decoder.seen.lock()[0], bytes.to_vec());
    }

    #[test]
    fn test_scratch_buffer_is_returned_to_pool() {
        let f = fixture(10, BitmapCounter::new(4, 100));
        let mut image = encoded(&f.factory, b"GIF89a-bytes");
        let _decoded = f.purgeable.decode(&image, &DecodeOptions::default()).unwrap();

        image.close().unwrap();
        assert_eq!(f.pool.used_bytes(), 0);
    }

    #[test]
    fn test_admitted_bitmap_release_updates_counter_and_recycles() {
        let f = fixture(60, BitmapCounter::new(4, 100));
        let image = encoded(&f.factory, b"GIF89a");

        let mut decoded = f.purgeable.decode(&image, &DecodeOptions::default()).unwrap();
        assert_eq!(f.purgeable.counter().count(), 1);
        assert_eq!(f.purgeable.counter().size(), 60);

        decoded.close().unwrap();
        assert_eq!(f.purgeable.counter().count(), 0);
        assert_eq!(f.decoder.recycled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_bitmap_is_recycled_and_counter_unchanged() {
        let f = fixture(60, BitmapCounter::new(4, 100));
        let image = encoded(&f.factory, b"GIF89a");

        let _first = f.purgeable.decode(&image, &DecodeOptions::default()).unwrap();
        let err = f
            .purgeable
            .decode(&image, &DecodeOptions::default())
            .unwrap_err();

        assert!(matches!(
            err,
            DecodeError::TooManyBitmaps(AdmissionError::TooManyBitmaps { size: 60, .. })
        ));
        assert_eq!(f.decoder.recycled.load(Ordering::SeqCst), 1);
        assert_eq!(f.purgeable.counter().count(), 1);
        assert_eq!(f.purgeable.counter().size(), 60);
    }

    #[test]
    fn test_closed_image_is_rejected() {
        let f = fixture(10, BitmapCounter::new(4, 100));
        let mut image = encoded(&f.factory, b"GIF89a");
        image.close().unwrap();
        assert!(matches!(
            f.purgeable.decode(&image, &DecodeOptions::default()),
            Err(DecodeError::Handle(_))
        ));
    }

    #[test]
    fn test_real_png_through_purgeable_path() {
        let pool = ByteArrayPool::new(PoolParams::new(vec![1024], 2, 4096).unwrap());
        let purgeable = PurgeableDecoder::new(
            Arc::new(ImageCrateDecoder::new()),
            Arc::clone(&pool),
            Arc::new(BitmapCounter::new(2, 1024)),
        );
        let mut png = Vec::new();
        ::image::RgbaImage::new(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), ::image::ImageFormat::Png)
            .unwrap();
        let image = encoded(&PooledByteBufferFactory::new(pool), &png);

        let decoded = purgeable.decode(&image, &DecodeOptions::default()).unwrap();
        let decoded = decoded.get().unwrap();
        assert_eq!(decoded.format(), ImageFormat::Png);
        assert_eq!(decoded.size_in_bytes(), 64);
    }
}
