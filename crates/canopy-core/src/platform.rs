//! Platform abstraction traits for Canopy runtime services.
//!
//! The dispatcher never starts threads on its own. Background work goes
//! through a [`TaskSpawner`], so hosts can plug in a thread pool, run work
//! inline for deterministic tests, or keep the default thread-per-task
//! behaviour.

use std::thread;

/// Work handed to a [`TaskSpawner`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs background work on behalf of the dispatcher.
///
/// Implementations must be safe to use from multiple threads. A task may be
/// run on any thread, including the caller's.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task: Task);
}

/// Spawner starting one thread per task.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, task: Task) {
        // The builder hands the closure back only through the join handle, so
        // a failed spawn loses the task. Surface it loudly.
        let spawned = thread::Builder::new()
            .name("canopy-async".into())
            .spawn(task);
        if let Err(err) = spawned {
            log::error!("spawning async task failed: {err}");
        }
    }
}

/// Spawner running tasks on the calling thread.
///
/// Useful in tests, where async work should finish before `run_async`
/// returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineSpawner;

impl TaskSpawner for InlineSpawner {
    fn spawn(&self, task: Task) {
        task();
    }
}
