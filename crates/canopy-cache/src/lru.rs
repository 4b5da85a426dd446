use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::collections::HashMap;
use crate::expiry::{ExpiryQueue, Slot};
use crate::{Cache, Item};

/// Byte budget used when none is configured.
pub const DEFAULT_MAX_SIZE: usize = 16_000_000;

type EvictCallback<V> = Box<dyn Fn(&str, &V) + Send + Sync + 'static>;

/// Least-used cache bounded by a byte budget.
///
/// Usage is approximated with a per-entry counter bumped on every hit. When
/// an insertion would overflow [`max_size`](Lru::max_size), entries are
/// evicted from the lowest priority up, where the priority of an expired
/// entry is zero and the usage count otherwise. Expired entries go first and
/// are dropped silently; live ones are reported to the eviction callback.
pub struct Lru<V> {
    max_size: usize,
    item_ttl: Option<Duration>,
    on_evict: Option<EvictCallback<V>>,
    clock: Arc<dyn Clock>,
    inner: Mutex<LruInner<V>>,
}

struct LruInner<V> {
    size: usize,
    next_stamp: u64,
    items: HashMap<String, LruEntry<V>>,
    queue: ExpiryQueue,
}

pub(crate) struct LruEntry<V> {
    pub(crate) count: u64,
    pub(crate) expires_at: Option<Instant>,
    stamp: u64,
    value: V,
}

impl<V> LruEntry<V> {
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    pub(crate) fn priority(&self, now: Instant) -> u64 {
        if self.is_expired(now) {
            0
        } else {
            self.count
        }
    }
}

impl<V: Item> LruInner<V> {
    fn new() -> Self {
        Self {
            size: 0,
            next_stamp: 0,
            items: HashMap::with_capacity(64),
            queue: ExpiryQueue::default(),
        }
    }

    fn insert(&mut self, key: &str, value: V, expires_at: Option<Instant>) {
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        if let Some(at) = expires_at {
            self.queue.push(key, stamp, at);
        }
        self.size += value.size();
        self.items.insert(
            key.to_owned(),
            LruEntry {
                count: 1,
                expires_at,
                stamp,
                value,
            },
        );
        let items = &self.items;
        self.queue.compact(items.len(), |key, stamp| {
            items.get(key).is_some_and(|entry| entry.stamp == stamp)
        });
    }

    fn remove(&mut self, key: &str) -> Option<LruEntry<V>> {
        let entry = self.items.remove(key)?;
        self.size -= entry.value.size();
        Some(entry)
    }

    /// Drops expired entries so they stop counting toward the totals.
    fn sweep(&mut self, now: Instant) {
        let Self {
            items, size, queue, ..
        } = self;
        queue.sweep(now, |key, stamp, expired| match items.get(key) {
            Some(entry) if entry.stamp == stamp => {
                if !expired {
                    return Slot::Live;
                }
                if let Some(entry) = items.remove(key) {
                    *size -= entry.value.size();
                }
                Slot::Expired
            }
            _ => Slot::Stale,
        });
    }

    /// Evicts entries until `incoming` more bytes fit in `max_size` or the
    /// cache is empty. Returns the live entries that were evicted.
    fn free(&mut self, incoming: usize, max_size: usize, now: Instant) -> Vec<(String, V)> {
        let mut order: Vec<(String, u64)> = self
            .items
            .iter()
            .map(|(key, entry)| (key.clone(), entry.priority(now)))
            .collect();
        sort_by_priority(&mut order);

        let mut evicted = Vec::new();
        while let Some((key, _)) = order.pop() {
            let expired = match self.items.get(&key) {
                Some(entry) => entry.is_expired(now),
                None => continue,
            };
            if expired {
                self.remove(&key);
                continue;
            }
            if self.size + incoming <= max_size {
                break;
            }
            if let Some(entry) = self.remove(&key) {
                evicted.push((key, entry.value));
            }
        }
        evicted
    }
}

/// Sorts by descending priority so the cheapest entry to evict is last.
pub(crate) fn sort_by_priority(order: &mut [(String, u64)]) {
    order.sort_by(|a, b| b.1.cmp(&a.1));
}

impl<V: Item + Clone> Lru<V> {
    /// Creates a cache with the default byte budget and no item expiry.
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            item_ttl: None,
            on_evict: None,
            clock: Arc::new(SystemClock),
            inner: Mutex::new(LruInner::new()),
        }
    }

    /// Sets the byte budget. Zero selects [`DEFAULT_MAX_SIZE`].
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = if max_size == 0 {
            DEFAULT_MAX_SIZE
        } else {
            max_size
        };
        self
    }

    /// Sets how long an item stays valid after it was set.
    pub fn with_item_ttl(mut self, item_ttl: Duration) -> Self {
        self.item_ttl = Some(item_ttl);
        self
    }

    /// Registers the function called when a live item is evicted to make room.
    pub fn with_on_evict(mut self, on_evict: impl Fn(&str, &V) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Box::new(on_evict));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn item_ttl(&self) -> Option<Duration> {
        self.item_ttl
    }

    fn lock(&self) -> MutexGuard<'_, LruInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut LruEntry<V>) -> R) -> Option<R> {
        self.lock().items.get_mut(key).map(f)
    }
}

impl<V: Item + Clone> Default for Lru<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Item + Clone> Cache<V> for Lru<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let entry = inner.items.get_mut(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.count += 1;
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: V) {
        let now = self.clock.now();
        let expires_at = self.item_ttl.map(|ttl| now + ttl);
        let evicted = {
            let mut inner = self.lock();
            inner.remove(key);
            let incoming = value.size();
            let evicted = if inner.size + incoming > self.max_size {
                inner.free(incoming, self.max_size, now)
            } else {
                Vec::new()
            };
            inner.insert(key, value, expires_at);
            evicted
        };

        for (key, value) in &evicted {
            log::debug!("lru cache evicted {key} ({} bytes)", value.size());
            if let Some(on_evict) = &self.on_evict {
                on_evict(key, value);
            }
        }
    }

    fn del(&self, key: &str) {
        self.lock().remove(key);
    }

    fn len(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.sweep(now);
        inner.items.len()
    }

    fn size(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.sweep(now);
        inner.size
    }
}

impl<V> fmt::Debug for Lru<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lru")
            .field("max_size", &self.max_size)
            .field("item_ttl", &self.item_ttl)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/lru_tests.rs"]
mod tests;
