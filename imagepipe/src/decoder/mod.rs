//! Bitmap decoding under admission control.
//!
//! The codec itself is external: anything implementing [`Decoder`] turns
//! encoded bytes into a [`Bitmap`]. [`PurgeableDecoder`] wraps a decoder
//! with pooled scratch memory and the bitmap admission counter.

mod purgeable;
mod raster;

pub use purgeable::PurgeableDecoder;
pub use raster::{ImageCrateDecoder, RasterBitmap};

use crate::encoded::ImageFormat;
use crate::memory::{AdmissionError, PoolError};
use crate::references::HandleError;
use std::fmt;
use thiserror::Error;

/// Errors from decoding an encoded image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot decode empty image")]
    EmptyInput,

    #[error("undecodable {format} image: {reason}")]
    Undecodable { format: ImageFormat, reason: String },

    #[error(transparent)]
    TooManyBitmaps(#[from] AdmissionError),

    #[error("scratch buffer unavailable: {0}")]
    Pool(#[from] PoolError),

    #[error("encoded image already released: {0}")]
    Handle(#[from] HandleError),
}

/// Pixel layout requested from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitmapConfig {
    #[default]
    Rgba8,
    Rgb8,
}

impl BitmapConfig {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            BitmapConfig::Rgba8 => 4,
            BitmapConfig::Rgb8 => 3,
        }
    }
}

/// Per-request decode settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    pub config: BitmapConfig,
}

/// A decoded bitmap as produced by a [`Decoder`].
pub trait Bitmap: Send + Sync + fmt::Debug {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Bytes of pixel memory held by this bitmap.
    fn size_in_bytes(&self) -> usize;

    /// Gives the bitmap's memory back to whoever allocated it.
    fn recycle(self: Box<Self>) {}
}

/// External codec boundary.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Box<dyn Bitmap>, DecodeError>;
}

/// An admitted bitmap together with its source format.
#[derive(Debug)]
pub struct DecodedImage {
    bitmap: Box<dyn Bitmap>,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn bitmap(&self) -> &dyn Bitmap {
        self.bitmap.as_ref()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.bitmap.size_in_bytes()
    }
}
