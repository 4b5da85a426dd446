//! Map type used by the caches.
//!
//! The `std-hash` feature swaps the hashbrown map for the standard library
//! one.

#[cfg(feature = "std-hash")]
pub(crate) use std::collections::HashMap;

#[cfg(not(feature = "std-hash"))]
pub(crate) use hashbrown::HashMap;
