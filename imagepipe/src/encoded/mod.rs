//! Encoded image bytes and their pooled storage.

mod buffer;
mod encoded_image;
mod format;

pub use buffer::{PooledByteBuffer, PooledByteBufferFactory};
pub use encoded_image::EncodedImage;
pub use format::{is_complete_jpeg, ImageFormat, JPEG_EOI};
