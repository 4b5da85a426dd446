//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform services
//! `canopy-core` leaves to the host: a [`ThreadPool`] running background
//! work for [`Dispatcher::run_async`], and a [`DispatchLoop`] draining a
//! dispatcher on its own thread whenever work is queued.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use canopy_core::{Dispatcher, Task, TaskSpawner};

/// Fixed set of worker threads fed through a channel.
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    /// Starts `workers` threads. Zero is bumped to one.
    pub fn new(workers: usize) -> Self {
        let size = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size)
            .filter_map(|index| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("canopy-worker-{index}"))
                    .spawn(move || run_worker(&receiver))
                    .map_err(|err| log::error!("starting worker {index} failed: {err}"))
                    .ok()
            })
            .collect();
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stops accepting tasks and waits for the queued ones to finish.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let current = thread::current().id();
        for worker in workers {
            // The last handle can be dropped by a task on the pool itself.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}

fn run_worker(receiver: &Mutex<Receiver<Task>>) {
    loop {
        let task = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(task) = task else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::error!("async task panicked");
        }
    }
}

impl TaskSpawner for ThreadPool {
    fn spawn(&self, task: Task) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                if let Err(mpsc::SendError(task)) = sender.send(task) {
                    log::warn!("thread pool is gone, running task inline");
                    task();
                }
            }
            None => {
                drop(sender);
                log::warn!("thread pool is shut down, running task inline");
                task();
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool").field("size", &self.size).finish()
    }
}

#[derive(Default)]
struct Signal {
    state: Mutex<SignalState>,
    changed: Condvar,
}

#[derive(Default)]
struct SignalState {
    pending: bool,
    stopped: bool,
}

impl Signal {
    fn notify(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending = true;
        self.changed.notify_one();
    }

    fn stop(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stopped = true;
        self.changed.notify_one();
    }

    /// Blocks until work is signalled. Returns `false` once stopped.
    fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.pending && !state.stopped {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.pending = false;
        !state.stopped
    }
}

/// Thread draining a [`Dispatcher`] each time work is queued on it.
///
/// The loop installs the dispatcher's wake hook; dropping it (or calling
/// [`stop`](Self::stop)) removes the hook and joins the thread.
pub struct DispatchLoop {
    dispatcher: Dispatcher,
    signal: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl DispatchLoop {
    pub fn start(dispatcher: Dispatcher) -> std::io::Result<Self> {
        let signal = Arc::new(Signal::default());
        let waker = Arc::clone(&signal);
        dispatcher.set_wake(move || waker.notify());

        let worker = dispatcher.clone();
        let listener = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name("canopy-dispatch".into())
            .spawn(move || {
                // Work queued before the hook was installed.
                while worker.consume_next() {}
                while listener.wait() {
                    while worker.consume_next() {}
                }
                log::debug!("dispatch loop stopped");
            });
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                dispatcher.clear_wake();
                return Err(err);
            }
        };

        Ok(Self {
            dispatcher,
            signal,
            thread: Some(thread),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.dispatcher.clear_wake();
        self.signal.stop();
        if thread.join().is_err() {
            log::error!("dispatch loop panicked");
        }
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DispatchLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchLoop")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use canopy_core::{component, elem, Component, Context, MemoryDocument, Ui};

    use super::*;

    fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[derive(Default)]
    struct Ticker {
        ticks: u32,
    }

    impl Component for Ticker {
        fn render(&self) -> Ui {
            elem("span").text(self.ticks).into()
        }

        fn on_mount(&mut self, ctx: &mut Context<'_>) {
            let Some(source) = ctx.source().cloned() else {
                return;
            };
            let dispatcher = ctx.dispatcher().clone();
            ctx.run_async(move || {
                for _ in 0..3 {
                    dispatcher.update(Some(source.clone()), |ctx| {
                        if let Some(ticker) = ctx.component_mut::<Ticker>() {
                            ticker.ticks += 1;
                        }
                    });
                }
            });
        }
    }

    #[test]
    fn pool_runs_every_task() {
        let pool = ThreadPool::new(3);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let done = Arc::clone(&done);
            pool.spawn(Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 50);
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn pool_survives_panicking_tasks() {
        let pool = ThreadPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        pool.spawn(Box::new(|| panic!("task failure")));
        let counter = Arc::clone(&done);
        pool.spawn(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shut_down_pool_runs_tasks_inline() {
        let pool = ThreadPool::new(0);
        pool.shutdown();
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        pool.spawn(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatcher_waits_for_pool_work() {
        let dispatcher = Dispatcher::builder()
            .with_spawner(Arc::new(ThreadPool::new(2)))
            .build();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            dispatcher.run_async(move || {
                thread::sleep(Duration::from_millis(2));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        dispatcher.wait();

        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn loop_drains_queued_work() {
        let document = Arc::new(MemoryDocument::new());
        let dispatcher = Dispatcher::builder()
            .with_document(document.clone())
            .with_spawner(Arc::new(ThreadPool::new(2)))
            .build();
        let body = dispatcher.body_handle().unwrap();
        let mut dispatch_loop = DispatchLoop::start(dispatcher.clone()).unwrap();

        dispatcher.mount(component(Ticker::default()));

        assert!(eventually(|| document.markup(body) == "<body><span>3</span></body>"));
        dispatch_loop.stop();
        assert!(dispatch_loop.dispatcher().is_idle());
    }

    #[test]
    fn stopped_loop_leaves_work_queued() {
        let dispatcher = Dispatcher::new();
        let mut dispatch_loop = DispatchLoop::start(dispatcher.clone()).unwrap();
        dispatch_loop.stop();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        dispatcher.next(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        dispatcher.consume();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
