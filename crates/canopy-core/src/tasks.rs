use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Counts outstanding async work.
///
/// Every task holds a [`TaskGuard`]; the count drops when the guard does,
/// including while unwinding from a panic.
#[derive(Debug, Default)]
pub(crate) struct TaskTracker {
    pending: Mutex<usize>,
    idle: Condvar,
}

impl TaskTracker {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn start(self: &Arc<Self>) -> TaskGuard {
        *self.lock() += 1;
        TaskGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        *self.lock()
    }

    /// Blocks until no task is outstanding.
    pub(crate) fn wait(&self) {
        let mut pending = self.lock();
        while *pending > 0 {
            pending = self
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns whether
    /// everything finished.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let pending = self.lock();
        let (pending, _) = self
            .idle
            .wait_timeout_while(pending, timeout, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *pending == 0
    }

    fn finish(&self) {
        let mut pending = self.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

pub(crate) struct TaskGuard {
    tracker: Arc<TaskTracker>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}
