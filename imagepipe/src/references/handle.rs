//! Owned, explicitly cloned handle over a shared resource slot.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Function invoked with the resource once its last handle is closed.
pub type Releaser<T> = Box<dyn FnOnce(T) + Send + Sync>;

/// Errors from operating on a handle whose ownership has already been given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    /// The handle was closed (explicitly or by a previous `close`).
    #[error("handle used after release")]
    Closed,
}

struct Slot<T> {
    value: T,
    releaser: Releaser<T>,
}

/// A reference-counted ownership unit for a pooled or allocated resource.
///
/// Each `Handle` is one reference. [`Handle::try_clone`] adds a reference,
/// [`Handle::close`] gives one up, and the releaser runs exactly once, when
/// the final reference is closed. Dropping an open handle closes it.
///
/// `Handle` deliberately does not implement [`Clone`]: sharing a resource is
/// always an explicit, fallible operation.
///
/// # Example
///
/// ```
/// use imagepipe::references::Handle;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let released = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&released);
/// let mut first = Handle::of(vec![1u8, 2, 3], move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// let mut second = first.try_clone().unwrap();
///
/// first.close().unwrap();
/// assert_eq!(released.load(Ordering::SeqCst), 0);
/// second.close().unwrap();
/// assert_eq!(released.load(Ordering::SeqCst), 1);
/// assert!(second.close().is_err());
/// ```
pub struct Handle<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> Handle<T> {
    /// Wraps `value` with a releaser; the new handle holds the only reference.
    pub fn of<R>(value: T, releaser: R) -> Self
    where
        R: FnOnce(T) + Send + Sync + 'static,
    {
        Self {
            slot: Some(Arc::new(Slot {
                value,
                releaser: Box::new(releaser),
            })),
        }
    }

    /// Wraps a value that needs no cleanup beyond being dropped.
    pub fn unpooled(value: T) -> Self
    where
        T: 'static,
    {
        Self::of(value, drop)
    }

    /// Borrows the underlying value.
    pub fn get(&self) -> Result<&T, HandleError> {
        self.slot
            .as_deref()
            .map(|slot| &slot.value)
            .ok_or(HandleError::Closed)
    }

    /// Adds a reference to the same slot.
    pub fn try_clone(&self) -> Result<Self, HandleError> {
        let slot = self.slot.as_ref().ok_or(HandleError::Closed)?;
        Ok(Self {
            slot: Some(Arc::clone(slot)),
        })
    }

    /// Gives up this reference, running the releaser if it was the last one.
    ///
    /// Closing an already closed handle is reported, never ignored.
    pub fn close(&mut self) -> Result<(), HandleError> {
        let slot = self.slot.take().ok_or(HandleError::Closed)?;
        release_slot(slot);
        Ok(())
    }

    /// Returns `true` while this handle still holds its reference.
    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    /// Number of open handles sharing this slot, or 0 if this one is closed.
    pub fn ref_count(&self) -> usize {
        self.slot.as_ref().map_or(0, Arc::strong_count)
    }

    /// Returns `true` if both handles are open and share one slot.
    pub fn shares_slot_with(&self, other: &Self) -> bool {
        match (&self.slot, &other.slot) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Drops one reference; `Arc::into_inner` hands the slot to exactly one
/// caller even when the last two references are closed concurrently.
fn release_slot<T>(slot: Arc<Slot<T>>) {
    if let Some(Slot { value, releaser }) = Arc::into_inner(slot) {
        releaser(value);
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            release_slot(slot);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(slot) => f
                .debug_struct("Handle")
                .field("value", &slot.value)
                .field("ref_count", &Arc::strong_count(slot))
                .finish(),
            None => f.write_str("Handle(<closed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(value: u32) -> (Handle<u32>, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let handle = Handle::of(value, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handle, released)
    }

    #[test]
    fn test_new_handle_has_single_reference() {
        let (handle, released) = counted(7);
        assert_eq!(handle.ref_count(), 1);
        assert_eq!(*handle.get().unwrap(), 7);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_releaser_fires_once_across_clones() {
        let (mut handle, released) = counted(1);
        let mut clones: Vec<_> = (0..5).map(|_| handle.try_clone().unwrap()).collect();
        assert_eq!(handle.ref_count(), 6);

        handle.close().unwrap();
        for clone in clones.iter_mut().take(4) {
            clone.close().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 0);

        clones[4].close().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_releaser_receives_value() {
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        let mut handle = Handle::of(42usize, move |v| sink.store(v, Ordering::SeqCst));
        handle.close().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_double_close_is_detected() {
        let (mut handle, released) = counted(3);
        assert!(handle.close().is_ok());
        assert_eq!(handle.close(), Err(HandleError::Closed));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_access_after_close_fails() {
        let (mut handle, _) = counted(3);
        handle.close().unwrap();
        assert!(!handle.is_valid());
        assert_eq!(handle.get(), Err(HandleError::Closed));
        assert!(handle.try_clone().is_err());
        assert_eq!(handle.ref_count(), 0);
    }

    #[test]
    fn test_drop_releases_open_handle() {
        let (handle, released) = counted(9);
        let clone = handle.try_clone().unwrap();
        drop(handle);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_after_close_does_not_release_again() {
        let (mut handle, released) = counted(9);
        handle.close().unwrap();
        drop(handle);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shares_slot_with() {
        let (handle, _) = counted(1);
        let clone = handle.try_clone().unwrap();
        let (other, _) = counted(1);
        assert!(handle.shares_slot_with(&clone));
        assert!(!handle.shares_slot_with(&other));
    }

    #[test]
    fn test_concurrent_close_releases_once() {
        let (handle, released) = counted(0);
        let clones: Vec<_> = (0..16).map(|_| handle.try_clone().unwrap()).collect();
        drop(handle);

        let threads: Vec<_> = clones
            .into_iter()
            .map(|mut h| std::thread::spawn(move || h.close().unwrap()))
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    struct DropFlag(Arc<AtomicUsize>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_unpooled_value_dropped_on_last_close() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut handle = Handle::unpooled(DropFlag(Arc::clone(&dropped)));
        let mut clone = handle.try_clone().unwrap();

        handle.close().unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        clone.close().unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_format() {
        let (mut handle, _) = counted(5);
        assert!(format!("{:?}", handle).contains("ref_count: 1"));
        handle.close().unwrap();
        assert_eq!(format!("{:?}", handle), "Handle(<closed>)");
    }
}
