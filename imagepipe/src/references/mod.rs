//! Reference-counted ownership of pooled and allocated resources.

mod handle;

pub use handle::{Handle, HandleError, Releaser};
