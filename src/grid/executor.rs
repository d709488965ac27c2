//! Striped task execution for partition operations and event delivery.
//!
//! Tasks are routed to a stripe (one thread each) by a hash, so all tasks
//! that share a hash run sequentially and in submission order, while tasks on
//! different stripes run in parallel.
use crate::error::GridError;
use crossbeam::channel::{Receiver, Sender, bounded, select, unbounded};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct StripedExecutor {
    name: String,
    stripes: Vec<Sender<Task>>,
    closed: AtomicBool,
    /// Dropping the sender wakes every stripe up for shutdown.
    shutdown: Mutex<Option<Sender<()>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl StripedExecutor {
    /// Spawns `threads` stripes named `{prefix}-{kind}-{index}`.
    pub(crate) fn start(prefix: &str, kind: &str, threads: usize) -> Result<Self, GridError> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut stripes = Vec::with_capacity(threads);
        let mut handles = Vec::with_capacity(threads);

        for index in 0..threads {
            let (tx, rx) = unbounded::<Task>();
            let shutdown = shutdown_rx.clone();
            let name = format!("{prefix}-{kind}-{index}");
            let thread_name = name.clone();

            // On failure the already spawned stripes observe the dropped
            // shutdown sender and exit on their own.
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_stripe(&thread_name, rx, shutdown))
                .map_err(|source| GridError::Spawn { name, source })?;

            stripes.push(tx);
            handles.push(handle);
        }

        Ok(Self {
            name: format!("{prefix}-{kind}"),
            stripes,
            closed: AtomicBool::new(false),
            shutdown: Mutex::new(Some(shutdown_tx)),
            handles: Mutex::new(handles),
        })
    }

    /// Queues `task` on the stripe selected by `hash`.
    ///
    /// Returns `false` if the executor has been shut down; the task is dropped.
    pub(crate) fn execute(&self, hash: u64, task: Task) -> bool {
        if self.closed.load(Acquire) {
            return false;
        }

        let stripe = (hash % self.stripes.len() as u64) as usize;
        self.stripes[stripe].send(task).is_ok()
    }

    /// Stops accepting tasks, lets every stripe drain its queue and joins it.
    pub(crate) fn shutdown(&self) {
        if self.closed.swap(true, Release) {
            return;
        }

        drop(
            self.shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let current = thread::current().id();
        for handle in handles {
            // a stripe cannot join itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(executor = %self.name, "stripe terminated with a panic");
            }
        }

        debug!(executor = %self.name, "executor stopped");
    }
}

fn run_stripe(name: &str, tasks: Receiver<Task>, shutdown: Receiver<()>) {
    loop {
        select! {
            recv(tasks) -> task => match task {
                Ok(task) => run_task(name, task),
                Err(_) => break,
            },
            recv(shutdown) -> _ => {
                for task in tasks.try_iter() {
                    run_task(name, task);
                }
                break;
            }
        }
    }
}

fn run_task(name: &str, task: Task) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
        error!(stripe = name, panic = %panic_message(&*payload), "task panicked");
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::Relaxed;

    #[test]
    fn test_same_hash_runs_in_order() {
        let executor = StripedExecutor::start("test", "ordered", 4).expect("executor starts");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            assert!(executor.execute(7, Box::new(move || seen.lock().unwrap().push(i))));
        }

        executor.shutdown();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_shutdown_drains_and_rejects() {
        let executor = StripedExecutor::start("test", "drain", 2).expect("executor starts");
        let counter = Arc::new(AtomicUsize::new(0));

        for hash in 0..1000 {
            let counter = Arc::clone(&counter);
            executor.execute(hash, Box::new(move || {
                counter.fetch_add(1, Relaxed);
            }));
        }

        executor.shutdown();
        assert_eq!(counter.load(Relaxed), 1000);

        assert!(!executor.execute(0, Box::new(|| {})));
        // a second shutdown is a no-op
        executor.shutdown();
    }

    #[test]
    fn test_panicking_task_keeps_stripe_alive() {
        let executor = StripedExecutor::start("test", "panic", 1).expect("executor starts");
        let counter = Arc::new(AtomicUsize::new(0));

        fn explode() {
            panic!("boom");
        }

        executor.execute(0, Box::new(explode));
        let after = Arc::clone(&counter);
        executor.execute(0, Box::new(move || {
            after.fetch_add(1, Relaxed);
        }));

        executor.shutdown();
        assert_eq!(counter.load(Relaxed), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
