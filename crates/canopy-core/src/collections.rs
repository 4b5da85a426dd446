//! Map types shared by the registries.
//!
//! The `std-hash` feature swaps the hashbrown maps for the standard library
//! ones.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::hash_map::RandomState as BuildHasher;
    pub use std::collections::HashMap;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::DefaultHashBuilder as BuildHasher;
    pub use hashbrown::HashMap;
}

/// Insertion ordered map hashed like [`map::HashMap`].
pub type OrderedMap<K, V> = indexmap::IndexMap<K, V, map::BuildHasher>;
