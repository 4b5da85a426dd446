use std::collections::VecDeque;
use std::time::Instant;

/// What the owner of an [`ExpiryQueue`] found for a queued slot.
pub(crate) enum Slot {
    /// The key was replaced or deleted since the slot was queued.
    Stale,
    /// The entry was expired and has been removed by the owner.
    Expired,
    /// The entry is still live; sweeping stops here.
    Live,
}

struct Queued {
    key: String,
    stamp: u64,
    expires_at: Instant,
}

/// FIFO of entries ordered by insertion.
///
/// With a uniform time to live, insertion order is also expiry order, so a
/// sweep only ever looks at the front of the queue.
#[derive(Default)]
pub(crate) struct ExpiryQueue {
    slots: VecDeque<Queued>,
}

impl ExpiryQueue {
    pub(crate) fn push(&mut self, key: &str, stamp: u64, expires_at: Instant) {
        self.slots.push_back(Queued {
            key: key.to_owned(),
            stamp,
            expires_at,
        });
    }

    /// Pops the expired prefix of the queue.
    ///
    /// `visit` receives each front slot with whether its deadline has passed
    /// and reports what it found. Stale and expired slots are dropped; the
    /// first live slot ends the sweep.
    pub(crate) fn sweep(&mut self, now: Instant, mut visit: impl FnMut(&str, u64, bool) -> Slot) {
        while let Some(front) = self.slots.front() {
            let expired = front.expires_at < now;
            match visit(&front.key, front.stamp, expired) {
                Slot::Stale | Slot::Expired => {
                    self.slots.pop_front();
                }
                Slot::Live => break,
            }
        }
    }

    /// Drops stale slots once they outnumber live entries.
    pub(crate) fn compact(&mut self, live: usize, mut is_current: impl FnMut(&str, u64) -> bool) {
        if self.slots.len() <= live * 2 + 16 {
            return;
        }
        self.slots.retain(|slot| is_current(&slot.key, slot.stamp));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
