//! # Worker Threads
//!
//! A worker is a plain loop running on an OS thread owned by its pool. It
//! pulls items from the pool's [`WorkQueue`](super::queue::WorkQueue), runs
//! them and records timing, until it is closed or retires after idling.
//!
//! ## Lifecycle
//! 1. The pool reserves a slot in `current_threads` and asks its
//!    [`WorkerSpawner`] for a thread
//! 2. The worker loops: wait for work, execute, account, repeat
//! 3. A failing or panicking item is logged and counted, never fatal
//! 4. On exit the worker releases its slot and unregisters itself, joining
//!    the handles earlier exits left behind and leaving its own for the next
//!    exit or `shutdown()` to reap
//!
//! ## Context
//! Worker threads do not inherit anything from the thread that happened to
//! trigger their creation. The only ambient state they get is the tracing
//! dispatcher captured when the pool was built, installed explicitly.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use corral_api::{PoolEvent, WorkError};
use tracing::{debug, trace, warn};

use crate::thread::config::IdlePolicy;
use crate::thread::pool::{join_worker, PoolShared};
use crate::thread::queue::{Dequeued, QueuedWork, WorkQueue};

/// Process-wide source of worker ids, unique across every pool.
static WORKER_IDS: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_worker_id() -> u64 {
    WORKER_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Thread entry point handed to a [`WorkerSpawner`].
pub type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Creates the OS threads workers run on.
///
/// The pool only ever calls this from `submit` or from its constructor, with
/// no pool lock held on the state mutex.
pub trait WorkerSpawner: fmt::Debug + Send + Sync {
    /// Starts a thread named `name` running `body`.
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<()>>;
}

/// Spawns plain `std::thread`s with the worker's name.
#[derive(Debug, Clone, Default)]
pub struct OsThreadSpawner {
    stack_size: Option<usize>,
}

impl OsThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack_size(stack_size: Option<usize>) -> Self {
        Self { stack_size }
    }
}

impl WorkerSpawner for OsThreadSpawner {
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(body)
    }
}

/// Why a worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitReason {
    /// The worker or the pool was closed.
    Closed,
    /// The wait for work timed out and the pool could spare the thread.
    Retired,
    /// The loop itself panicked.
    Failed,
}

/// Live workers of one pool, guarded by a mutex separate from the queue lock.
///
/// Lock order: the queue lock may be held while taking this one, never the
/// other way round.
#[derive(Default)]
pub(crate) struct WorkerRegistry {
    pub(crate) live: HashMap<u64, Arc<WorkerHandle>>,
    /// Join handles of workers that unregistered themselves. Each exiting
    /// worker joins the ones already here, so at most one is ever pending
    /// outside of shutdown.
    pub(crate) finished: Vec<JoinHandle<()>>,
    /// Workers that exited before their spawner returned a handle.
    pub(crate) exited_unregistered: HashSet<u64>,
}

impl WorkerRegistry {
    /// Records the thread of a freshly spawned worker, or parks it with the
    /// finished ones if the worker already ran to completion.
    pub(crate) fn register(
        &mut self,
        id: u64,
        name: String,
        close_requested: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    ) {
        if self.exited_unregistered.remove(&id) {
            self.finished.push(thread);
        } else {
            self.live
                .insert(id, Arc::new(WorkerHandle::new(name, close_requested, thread)));
        }
    }
}

/// The pool's side of a running worker.
pub(crate) struct WorkerHandle {
    name: String,
    close_requested: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    pub(crate) fn new(name: String, close_requested: Arc<AtomicBool>, thread: JoinHandle<()>) -> Self {
        Self {
            name,
            close_requested,
            thread: Mutex::new(Some(thread)),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Asks the worker to stop and wakes it if it is blocked on the queue.
    pub(crate) fn close(&self, queue: &WorkQueue) {
        self.close_requested.store(true, Ordering::Release);
        // Waiters share one condvar, so waking just one could miss this worker.
        queue.notify_all();
    }

    pub(crate) fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// The loop running on a worker thread.
pub(crate) struct Worker {
    id: u64,
    name: String,
    shared: Arc<PoolShared>,
    close_requested: Arc<AtomicBool>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("close_requested", &self.close_requested.load(Ordering::Relaxed))
            .finish()
    }
}

impl Worker {
    pub(crate) fn new(
        id: u64,
        name: String,
        shared: Arc<PoolShared>,
        close_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            name,
            shared,
            close_requested,
        }
    }

    /// Thread body: installs the pool's dispatcher, runs the loop, unregisters.
    pub(crate) fn run(self) {
        let dispatch = self.shared.dispatch.clone();
        tracing::dispatcher::with_default(&dispatch, move || {
            let span = crate::pool_span!(self.shared.name(), self.name.as_str());
            let _entered = span.enter();

            debug!("worker started");
            self.shared.emit(PoolEvent::WorkerStarted {
                worker: self.name.clone(),
            });

            let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.run_loop())) {
                Ok(reason) => reason,
                Err(payload) => {
                    let err = WorkError::from_panic(payload);
                    crate::log_error!(err, "worker loop failed");
                    ExitReason::Failed
                }
            };
            self.exit(reason);
        });
    }

    fn run_loop(&self) -> ExitReason {
        let idle_timeout = self.shared.config.idle_timeout;
        loop {
            match self.shared.queue.dequeue(idle_timeout, &self.close_requested) {
                Dequeued::Work(item) => self.perform(item),
                Dequeued::TimedOut => {
                    if self.try_retire() {
                        return ExitReason::Retired;
                    }
                    trace!("idle wait timed out");
                }
                Dequeued::Closed => return ExitReason::Closed,
            }
        }
    }

    /// Runs one item. The item is consumed by the call, so nothing it captured
    /// outlives this function.
    fn perform(&self, item: QueuedWork) {
        let work_name = item.work.name().to_string();
        let work = item.work;

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || work.do_work()));
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(WorkError::Failed(err)),
            Err(payload) => Err(WorkError::from_panic(payload)),
        };

        let snapshot = {
            let mut state = self.shared.queue.lock();
            state.record_completion(elapsed, result.is_err());
            state.snapshot()
        };
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok(()) => {
                trace!(work = %work_name, elapsed_ms, "work completed");
                self.shared.emit_with(
                    PoolEvent::WorkCompleted {
                        work: work_name,
                        elapsed_ms,
                    },
                    snapshot,
                );
            }
            Err(err) => {
                warn!(work = %work_name, elapsed_ms, error = %err, "work failed");
                self.shared.emit_with(
                    PoolEvent::WorkFailed {
                        work: work_name,
                        error: err.to_string(),
                    },
                    snapshot,
                );
            }
        }
    }

    /// Gives up this worker's slot if the pool is allowed to shrink.
    fn try_retire(&self) -> bool {
        let config = &self.shared.config;
        if config.idle_policy != IdlePolicy::Retire {
            return false;
        }
        let mut state = self.shared.queue.lock();
        if state.items.is_empty() && !state.shut_down && state.current_threads > config.min_threads {
            state.current_threads -= 1;
            true
        } else {
            false
        }
    }

    fn exit(self, reason: ExitReason) {
        let retired = reason == ExitReason::Retired;
        if !retired {
            let mut state = self.shared.queue.lock();
            state.current_threads = state.current_threads.saturating_sub(1);
        }

        let reaped = {
            let mut registry = self.shared.lock_workers();
            let reaped = mem::take(&mut registry.finished);
            match registry.live.remove(&self.id) {
                Some(handle) => {
                    if let Some(thread) = handle.take_thread() {
                        registry.finished.push(thread);
                    }
                }
                // The spawner has not handed back this thread yet.
                None => {
                    registry.exited_unregistered.insert(self.id);
                }
            }
            reaped
        };
        // Those threads already unregistered, so these joins return promptly.
        for thread in reaped {
            join_worker(self.shared.name(), "finished", thread);
        }

        debug!(?reason, "worker exited");
        self.shared.emit(PoolEvent::WorkerExited {
            worker: self.name,
            retired,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_ids_are_unique() {
        let a = next_worker_id();
        let b = next_worker_id();
        assert!(b > a);
    }

    #[test]
    fn test_os_spawner_names_thread() {
        let spawner = OsThreadSpawner::with_stack_size(Some(256 * 1024));
        let handle = spawner
            .spawn(
                "p: unit; w: 1".to_string(),
                Box::new(|| {
                    assert_eq!(thread::current().name(), Some("p: unit; w: 1"));
                }),
            )
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_handle_close_sets_flag_and_yields_thread_once() {
        let queue = WorkQueue::new("handles");
        let flag = Arc::new(AtomicBool::new(false));
        let thread = thread::spawn(|| {});
        let handle = WorkerHandle::new("p: unit; w: 2".to_string(), flag.clone(), thread);

        handle.close(&queue);
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(handle.name(), "p: unit; w: 2");
        assert!(handle.take_thread().unwrap().join().is_ok());
        assert!(handle.take_thread().is_none());
    }
}
