//! Key/value caches with byte-size accounting.
//!
//! Two interchangeable eviction policies are provided behind the [`Cache`]
//! trait:
//!
//! - [`Lru`] keeps entries under a byte budget and evicts the least used ones
//!   when a new item would not fit. Entries may also carry a time to live.
//! - [`Expire`] keeps every entry for the same fixed duration and drops them
//!   lazily, oldest first.
//!
//! Both caches are safe to share between threads. The [`prerender`] module
//! specialises them for pages rendered ahead of time on the server.

mod clock;
mod collections;
mod expire;
mod expiry;
mod lru;
pub mod prerender;

use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use expire::Expire;
pub use lru::{Lru, DEFAULT_MAX_SIZE};
pub use prerender::{PreRenderCache, PreRenderLru, PreRenderMap, PreRenderedItem};

/// Describes a value that can be stored in a cache.
pub trait Item {
    /// The number of bytes the item occupies in a cache.
    fn size(&self) -> usize;
}

impl Item for str {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Item for [u8] {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Item for String {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Item for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Item for &'static str {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Item for i64 {
    fn size(&self) -> usize {
        std::mem::size_of::<i64>()
    }
}

impl Item for f64 {
    fn size(&self) -> usize {
        std::mem::size_of::<f64>()
    }
}

impl<T: Item + ?Sized> Item for Arc<T> {
    fn size(&self) -> usize {
        (**self).size()
    }
}

impl<T: Item + ?Sized> Item for Box<T> {
    fn size(&self) -> usize {
        (**self).size()
    }
}

/// Common contract of the cache policies.
///
/// A missing or expired key is reported as `None`; none of the operations
/// fail.
pub trait Cache<V> {
    /// Returns the item stored under `key`, unless it is absent or expired.
    fn get(&self, key: &str) -> Option<V>;

    /// Stores `value` under `key`, replacing any previous item.
    fn set(&self, key: &str, value: V);

    /// Removes the item stored under `key`.
    fn del(&self, key: &str);

    /// The number of live items.
    fn len(&self) -> usize;

    /// The sum of the sizes of the live items, in bytes.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
pub(crate) mod tests;
