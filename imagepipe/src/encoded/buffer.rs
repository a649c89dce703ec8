//! Byte buffers backed by the byte-array pool.

use crate::memory::{ByteArrayPool, PoolError};
use crate::references::Handle;
use std::sync::Arc;

/// Immutable bytes living in a (possibly larger) pooled array.
#[derive(Debug)]
pub struct PooledByteBuffer {
    storage: Vec<u8>,
    len: usize,
}

impl PooledByteBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing array.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }
}

/// Creates [`PooledByteBuffer`] handles from a shared pool.
///
/// Payloads larger than the pool's largest bucket are stored in plain
/// allocations; everything else draws from, and returns to, the pool.
#[derive(Debug, Clone)]
pub struct PooledByteBufferFactory {
    pool: Arc<ByteArrayPool>,
}

impl PooledByteBufferFactory {
    pub fn new(pool: Arc<ByteArrayPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ByteArrayPool> {
        &self.pool
    }

    /// Copies `data` into a new buffer.
    pub fn new_byte_buffer(&self, data: &[u8]) -> Result<Handle<PooledByteBuffer>, PoolError> {
        if data.len() > self.pool.params().max_bucket_size() {
            return Ok(Handle::unpooled(PooledByteBuffer {
                storage: data.to_vec(),
                len: data.len(),
            }));
        }

        let mut storage = self.pool.get(data.len())?;
        storage[..data.len()].copy_from_slice(data);
        let release = self.pool.releaser();
        Ok(Handle::of(
            PooledByteBuffer {
                storage,
                len: data.len(),
            },
            move |buffer: PooledByteBuffer| release(buffer.storage),
        ))
    }
}
