//! A single size class of the byte-array pool.

use std::collections::VecDeque;

/// Free list and in-use accounting for one canonical buffer size.
///
/// Buckets are always accessed under their pool's per-bucket lock; nothing
/// here allocates or frees memory except through the values it returns.
#[derive(Debug)]
pub(crate) struct Bucket {
    item_size: usize,
    max_free: usize,
    free: VecDeque<Vec<u8>>,
    in_use: usize,
}

/// What happened to a buffer given back to a bucket.
#[derive(Debug)]
pub(crate) enum Returned {
    /// Kept on the free list for reuse.
    Pooled,
    /// Free list was full; the caller drops the buffer outside the lock.
    Overflow(Vec<u8>),
}

impl Bucket {
    pub(crate) fn new(item_size: usize, max_free: usize) -> Self {
        Self {
            item_size,
            max_free,
            free: VecDeque::with_capacity(max_free),
            in_use: 0,
        }
    }

    pub(crate) fn item_size(&self) -> usize {
        self.item_size
    }

    /// Marks one buffer as handed out, returning a pooled one if available.
    pub(crate) fn checkout(&mut self) -> Option<Vec<u8>> {
        self.in_use += 1;
        self.free.pop_front()
    }

    /// Returns a buffer; `None` means more buffers came back than went out.
    pub(crate) fn give_back(&mut self, buffer: Vec<u8>) -> Option<Returned> {
        if self.in_use == 0 {
            return None;
        }
        self.in_use -= 1;
        if self.free.len() < self.max_free {
            self.free.push_back(buffer);
            Some(Returned::Pooled)
        } else {
            Some(Returned::Overflow(buffer))
        }
    }

    /// Removes free entries beyond `keep`, handing them to the caller.
    pub(crate) fn trim_to(&mut self, keep: usize) -> Vec<Vec<u8>> {
        let mut removed = Vec::new();
        while self.free.len() > keep {
            if let Some(buffer) = self.free.pop_back() {
                removed.push(buffer);
            }
        }
        removed
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    pub(crate) fn free_len(&self) -> usize {
        self.free.len()
    }
}
