use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::collections::HashMap;
use crate::expiry::{ExpiryQueue, Slot};
use crate::{Cache, Item};

/// Cache where every item lives for the same duration.
///
/// Items are queued in insertion order. Each `set` and `del` drops the
/// expired front of the queue, so cleanup costs are proportional to the
/// number of expired items rather than the cache size. `get` never returns an
/// item past its deadline, even when no sweep happened yet.
pub struct Expire<V> {
    item_ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<ExpireInner<V>>,
}

struct ExpireInner<V> {
    size: usize,
    next_stamp: u64,
    items: HashMap<String, ExpireEntry<V>>,
    queue: ExpiryQueue,
}

pub(crate) struct ExpireEntry<V> {
    pub(crate) expires_at: Instant,
    stamp: u64,
    value: V,
}

impl<V: Item> ExpireInner<V> {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.items.remove(key) {
            self.size -= entry.value.size();
        }
    }

    fn expire(&mut self, now: Instant) {
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
}

impl<V: Item + Clone> Expire<V> {
    pub fn new(item_ttl: Duration) -> Self {
        Self {
            item_ttl,
            clock: Arc::new(SystemClock),
            inner: Mutex::new(ExpireInner {
                size: 0,
                next_stamp: 0,
                items: HashMap::new(),
                queue: ExpiryQueue::default(),
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn item_ttl(&self) -> Duration {
        self.item_ttl
    }

    fn lock(&self) -> MutexGuard<'_, ExpireInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }
}

impl<V: Item + Clone> Cache<V> for Expire<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let inner = self.lock();
        let entry = inner.items.get(key)?;
        if entry.expires_at < now {
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: V) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.remove(key);
        inner.expire(now);

        inner.next_stamp += 1;
        let stamp = inner.next_stamp;
        let expires_at = now + self.item_ttl;
        inner.queue.push(key, stamp, expires_at);
        inner.size += value.size();
        inner.items.insert(
            key.to_owned(),
            ExpireEntry {
                expires_at,
                stamp,
                value,
            },
        );

        let ExpireInner { items, queue, .. } = &mut *inner;
        queue.compact(items.len(), |key, stamp| {
            items.get(key).is_some_and(|entry| entry.stamp == stamp)
        });
    }

    fn del(&self, key: &str) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.remove(key);
        inner.expire(now);
    }

    fn len(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.expire(now);
        inner.items.len()
    }

    fn size(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.expire(now);
        inner.size
    }
}

impl<V> fmt::Debug for Expire<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expire")
            .field("item_ttl", &self.item_ttl)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/expire_tests.rs"]
mod tests;
