//! Admission control for decoded bitmap memory.

use parking_lot::Mutex;
use thiserror::Error;

/// Default cap on concurrently admitted bitmaps.
pub const DEFAULT_MAX_BITMAP_COUNT: usize = 384;

/// Default cap on aggregate admitted bitmap bytes (256 MB).
pub const DEFAULT_MAX_BITMAP_SIZE: usize = 256 * 1024 * 1024;

/// A bitmap was rejected because admitting it would exceed a limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error(
        "too many bitmaps: admitting {size} bytes would give {count}+1 bitmaps \
         (max {max_count}) and {total}+{size} bytes (max {max_size})"
    )]
    TooManyBitmaps {
        size: usize,
        count: usize,
        total: usize,
        max_count: usize,
        max_size: usize,
    },
}

/// A release did not match any earlier admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    #[error("bitmap counter underflow: releasing {size} bytes with {count} bitmaps and {total} bytes admitted")]
    Underflow {
        size: usize,
        count: usize,
        total: usize,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    count: usize,
    size: usize,
}

/// Tracks `(count, total size)` of live bitmaps against fixed maxima.
///
/// Every observable state satisfies `count <= max_count` and
/// `size <= max_size`. The counter never owns bitmaps; callers pair each
/// successful [`BitmapCounter::try_admit`] with one [`BitmapCounter::release`].
#[derive(Debug)]
pub struct BitmapCounter {
    max_count: usize,
    max_size: usize,
    totals: Mutex<Totals>,
}

impl BitmapCounter {
    pub fn new(max_count: usize, max_size: usize) -> Self {
        Self {
            max_count,
            max_size,
            totals: Mutex::new(Totals::default()),
        }
    }

    /// Admits a bitmap of `size` bytes, or rejects it leaving state unchanged.
    pub fn try_admit(&self, size: usize) -> Result<(), AdmissionError> {
        let mut totals = self.totals.lock();
        let fits = totals.count < self.max_count
            && totals
                .size
                .checked_add(size)
                .is_some_and(|total| total <= self.max_size);
        if !fits {
            return Err(AdmissionError::TooManyBitmaps {
                size,
                count: totals.count,
                total: totals.size,
                max_count: self.max_count,
                max_size: self.max_size,
            });
        }
        totals.count += 1;
        totals.size += size;
        Ok(())
    }

    /// Releases one admitted bitmap of `size` bytes.
    pub fn release(&self, size: usize) -> Result<(), CounterError> {
        let mut totals = self.totals.lock();
        if totals.count == 0 || totals.size < size {
            return Err(CounterError::Underflow {
                size,
                count: totals.count,
                total: totals.size,
            });
        }
        totals.count -= 1;
        totals.size -= size;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.totals.lock().count
    }

    pub fn size(&self) -> usize {
        self.totals.lock().size
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for BitmapCounter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BITMAP_COUNT, DEFAULT_MAX_BITMAP_SIZE)
    }
}
