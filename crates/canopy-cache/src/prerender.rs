//! Caches for pages rendered ahead of time on the server.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::collections::HashMap;
use crate::{Cache, Item, Lru};

/// A rendered response stored under its request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreRenderedItem {
    pub path: String,
    pub content_type: String,
    pub content_encoding: String,
    pub body: Arc<[u8]>,
}

impl PreRenderedItem {
    pub fn new(path: impl Into<String>, body: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            content_type: String::new(),
            content_encoding: String::new(),
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = content_encoding.into();
        self
    }
}

impl Item for PreRenderedItem {
    fn size(&self) -> usize {
        self.body.len()
    }
}

/// Store of pre-rendered responses keyed by path.
pub trait PreRenderCache: Send + Sync {
    fn get(&self, path: &str) -> Option<PreRenderedItem>;

    /// Stores `item` under its own path.
    fn set(&self, item: PreRenderedItem);
}

pub type EvictHook = Box<dyn Fn(&str, &PreRenderedItem) + Send + Sync + 'static>;

/// [`Lru`] holding [`PreRenderedItem`]s.
#[derive(Debug)]
pub struct PreRenderLru {
    lru: Lru<PreRenderedItem>,
}

impl PreRenderLru {
    /// Creates a cache bounded to `max_size` body bytes where items live for
    /// `item_ttl`.
    pub fn new(max_size: usize, item_ttl: Duration) -> Self {
        Self::with_evict_hooks(max_size, item_ttl, Vec::new())
    }

    /// Same as [`new`](Self::new), calling every hook in order when an item is
    /// evicted to make room for another.
    pub fn with_evict_hooks(max_size: usize, item_ttl: Duration, hooks: Vec<EvictHook>) -> Self {
        let mut lru = Lru::new().with_max_size(max_size).with_item_ttl(item_ttl);
        if !hooks.is_empty() {
            lru = lru.with_on_evict(move |path, item| {
                for hook in &hooks {
                    hook(path, item);
                }
            });
        }
        Self { lru }
    }

    /// Swaps the underlying cache, mostly to inject a clock.
    pub fn from_lru(lru: Lru<PreRenderedItem>) -> Self {
        Self { lru }
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn size(&self) -> usize {
        self.lru.size()
    }
}

impl PreRenderCache for PreRenderLru {
    fn get(&self, path: &str) -> Option<PreRenderedItem> {
        self.lru.get(path)
    }

    fn set(&self, item: PreRenderedItem) {
        let path = item.path.clone();
        self.lru.set(&path, item);
    }
}

/// Unbounded map used when no eviction policy is configured.
#[derive(Debug, Default)]
pub struct PreRenderMap {
    items: RwLock<HashMap<String, PreRenderedItem>>,
}

impl PreRenderMap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }
}

impl PreRenderCache for PreRenderMap {
    fn get(&self, path: &str) -> Option<PreRenderedItem> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn set(&self, item: PreRenderedItem) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.path.clone(), item);
    }
}

#[cfg(test)]
#[path = "tests/prerender_tests.rs"]
mod tests;
