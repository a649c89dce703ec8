use super::buffer::PooledByteBuffer;
use super::format::ImageFormat;
use crate::references::{Handle, HandleError};

/// Encoded image bytes plus the metadata sniffed from them.
///
/// Holds one reference to a shared [`PooledByteBuffer`]. Passing an image
/// downstream means handing over a [`EncodedImage::try_clone`]; the holder
/// that created or cloned an image closes it when done.
#[derive(Debug)]
pub struct EncodedImage {
    buffer: Handle<PooledByteBuffer>,
    format: ImageFormat,
    orientation: Option<u16>,
    size: usize,
}

impl EncodedImage {
    /// Wraps a buffer handle, taking over its reference.
    pub fn new(buffer: Handle<PooledByteBuffer>) -> Result<Self, HandleError> {
        let (format, size) = {
            let bytes = buffer.get()?;
            (ImageFormat::detect(bytes.as_slice()), bytes.len())
        };
        Ok(Self {
            buffer,
            format,
            orientation: None,
            size,
        })
    }

    /// Records an orientation read from embedded metadata.
    pub fn with_orientation(mut self, orientation: u16) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Adds a reference to the same bytes.
    pub fn try_clone(&self) -> Result<Self, HandleError> {
        Ok(Self {
            buffer: self.buffer.try_clone()?,
            format: self.format,
            orientation: self.orientation,
            size: self.size,
        })
    }

    /// Gives up this image's reference to its bytes.
    pub fn close(&mut self) -> Result<(), HandleError> {
        self.buffer.close()
    }

    pub fn bytes(&self) -> Result<&[u8], HandleError> {
        Ok(self.buffer.get()?.as_slice())
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn orientation(&self) -> Option<u16> {
        self.orientation
    }

    /// Length of the encoded payload in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_valid(&self) -> bool {
        self.buffer.is_valid()
    }

    pub fn ref_count(&self) -> usize {
        self.buffer.ref_count()
    }

    pub fn shares_buffer_with(&self, other: &EncodedImage) -> bool {
        self.buffer.shares_slot_with(&other.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoded::PooledByteBufferFactory;
    use crate::memory::{ByteArrayPool, PoolParams};

    fn image(bytes: &[u8]) -> (EncodedImage, PooledByteBufferFactory) {
        let factory = PooledByteBufferFactory::new(ByteArrayPool::new(
            PoolParams::new(vec![64], 4, 1024).unwrap(),
        ));
        let image = EncodedImage::new(factory.new_byte_buffer(bytes).unwrap()).unwrap();
        (image, factory)
    }

    #[test]
    fn test_metadata_is_detected() {
        let (image, _factory) = image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        assert_eq!(image.format(), ImageFormat::Jpeg);
        assert_eq!(image.size(), 5);
        assert_eq!(image.orientation(), None);
        assert_eq!(image.with_orientation(6).orientation(), Some(6));
    }

    #[test]
    fn test_clone_shares_bytes_until_last_close() {
        let (mut image, factory) = image(b"payload");
        let mut clone = image.try_clone().unwrap();
        assert!(image.shares_buffer_with(&clone));
        assert_eq!(image.ref_count(), 2);

        image.close().unwrap();
        assert_eq!(clone.bytes().unwrap(), b"payload");
        assert_eq!(factory.pool().used_bytes(), 64);

        clone.close().unwrap();
        assert_eq!(factory.pool().used_bytes(), 0);
    }

    #[test]
    fn test_closed_image_rejects_access() {
        let (mut image, _factory) = image(b"payload");
        image.close().unwrap();
        assert!(!image.is_valid());
        assert_eq!(image.bytes(), Err(HandleError::Closed));
        assert!(image.try_clone().is_err());
        assert_eq!(image.close(), Err(HandleError::Closed));
    }
}
