//! # Thread Pool
//!
//! `ThreadPool` owns one [`WorkQueue`], the set of live workers and the
//! aggregate counters. There is no pool thread: bookkeeping runs on whichever
//! thread calls `submit`, an accessor or `shutdown`.
//!
//! ## Growth heuristic
//! After every enqueue, still under the queue lock: if fewer workers are idle
//! than items are pending, and no other creation is in flight, reserve a slot
//! and start one more worker (never beyond `max_threads`). Otherwise wake one
//! idle worker. The rule is greedy and does not forecast load.
//!
//! ## Locking
//! - Queue lock: items, thread counters, processed/time totals, creation flag
//! - Worker registry lock: live worker handles, only touched on worker start,
//!   worker exit and shutdown
//!
//! The queue lock is never held across a thread spawn, a join, a work item or
//! a monitor callback.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use corral_api::{BoxedWork, PoolEvent, PoolMonitor, PoolSnapshot, PoolStatistics, Work};
use tracing::{error, warn};

use crate::logging;
use crate::thread::config::{IdlePolicy, ThreadPoolConfig};
use crate::thread::error::{PoolError, PoolResult};
use crate::thread::queue::{PoolState, WorkQueue};
use crate::thread::worker::{
    next_worker_id, OsThreadSpawner, Worker, WorkerHandle, WorkerRegistry, WorkerSpawner,
};

/// State shared between the pool handle and its worker threads.
pub(crate) struct PoolShared {
    pub(crate) config: ThreadPoolConfig,
    pub(crate) queue: WorkQueue,
    workers: Mutex<WorkerRegistry>,
    spawner: Arc<dyn WorkerSpawner>,
    monitor: Option<Arc<dyn PoolMonitor>>,
    /// Dispatcher captured at construction and installed on every worker.
    pub(crate) dispatch: tracing::Dispatch,
    /// Serialises concurrent `shutdown()` calls.
    shutdown_lock: Mutex<()>,
}

impl PoolShared {
    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn lock_workers(&self) -> MutexGuard<'_, WorkerRegistry> {
        self.workers.lock().unwrap_or_else(|poisoned| {
            warn!(pool = %self.config.name, "worker registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Pushes `event` to the monitor with a fresh snapshot.
    pub(crate) fn emit(&self, event: PoolEvent) {
        if let Some(monitor) = &self.monitor {
            let snapshot = self.queue.lock().snapshot();
            monitor.on_event(self.name(), &event, &snapshot);
        }
    }

    /// Pushes `event` with a snapshot the caller already took.
    pub(crate) fn emit_with(&self, event: PoolEvent, snapshot: PoolSnapshot) {
        if let Some(monitor) = &self.monitor {
            monitor.on_event(self.name(), &event, &snapshot);
        }
    }

    /// Claims a slot for a new worker. Must be followed by
    /// [`start_reserved_worker`](Self::start_reserved_worker) once the lock is
    /// released.
    fn try_reserve_worker(&self, state: &mut PoolState) -> bool {
        if state.creating_worker || state.shut_down {
            return false;
        }
        if let Some(max) = self.config.max_threads {
            if state.current_threads >= max {
                return false;
            }
        }
        state.current_threads += 1;
        state.creating_worker = true;
        true
    }

    fn start_reserved_worker(self: &Arc<Self>) {
        let id = next_worker_id();
        let name = format!("p: {}; w: {}", self.name(), id);
        let close_requested = Arc::new(AtomicBool::new(false));
        let worker = Worker::new(id, name.clone(), Arc::clone(self), close_requested.clone());

        // Spawned outside the registry lock; a worker that finishes before its
        // handle is stored is reconciled by `register`.
        let spawned = self
            .spawner
            .spawn(name.clone(), Box::new(move || worker.run()))
            .map(|thread| {
                self.lock_workers()
                    .register(id, name.clone(), close_requested, thread);
            });

        let mut state = self.queue.lock();
        state.creating_worker = false;
        match spawned {
            Ok(()) => {
                drop(state);
                crate::log_worker!(name.as_str(), "spawned", pool = %self.name());
            }
            Err(err) => {
                // Roll the reservation back, then count the attempt again as
                // cleanup. A failed creation therefore still adds one thread
                // to current_threads with nothing running behind it.
                state.current_threads -= 1;
                state.current_threads += 1;
                let snapshot = state.snapshot();
                drop(state);

                error!(
                    pool = %self.name(),
                    worker = %name,
                    error = %err,
                    current_threads = snapshot.current_threads,
                    "failed to create worker thread"
                );
                self.emit_with(
                    PoolEvent::WorkerCreationFailed {
                        reason: err.to_string(),
                    },
                    snapshot,
                );
            }
        }
    }
}

/// A worker thread pool with a single shared FIFO work queue.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use corral::thread::ThreadPool;
///
/// let pool = ThreadPool::bounded(1, 4, Duration::from_secs(2)).unwrap();
/// let hits = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     let hits = hits.clone();
///     pool.execute(move || {
///         hits.fetch_add(1, Ordering::SeqCst);
///     })
///     .unwrap();
/// }
/// pool.shutdown();
/// assert_eq!(pool.current_thread_count(), 0);
/// ```
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.shared.config.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ThreadPool {
    /// Bounded pool with `min` workers started before this returns.
    ///
    /// Fails with [`PoolError::InvalidConfig`] when `min > max` or `max == 0`.
    pub fn bounded(min: usize, max: usize, idle_timeout: Duration) -> PoolResult<Self> {
        Self::new(ThreadPoolConfig::bounded(min, max, idle_timeout))
    }

    /// Unbounded pool; workers are created only on demand.
    pub fn unbounded() -> Self {
        Self::start(ThreadPoolConfig::unbounded(), Arc::new(OsThreadSpawner::new()), None)
    }

    pub fn new(config: ThreadPoolConfig) -> PoolResult<Self> {
        let spawner = Arc::new(OsThreadSpawner::with_stack_size(config.thread_stack_size));
        Self::with_spawner(config, spawner, None)
    }

    /// Like [`new`](Self::new), pushing events to `monitor`.
    pub fn with_monitor(config: ThreadPoolConfig, monitor: Arc<dyn PoolMonitor>) -> PoolResult<Self> {
        let spawner = Arc::new(OsThreadSpawner::with_stack_size(config.thread_stack_size));
        Self::with_spawner(config, spawner, Some(monitor))
    }

    /// Full control over thread creation and monitoring.
    pub fn with_spawner(
        config: ThreadPoolConfig,
        spawner: Arc<dyn WorkerSpawner>,
        monitor: Option<Arc<dyn PoolMonitor>>,
    ) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self::start(config, spawner, monitor))
    }

    fn start(
        config: ThreadPoolConfig,
        spawner: Arc<dyn WorkerSpawner>,
        monitor: Option<Arc<dyn PoolMonitor>>,
    ) -> Self {
        let queue = WorkQueue::new(format!("{}-workqueue", config.name));
        let min_threads = config.min_threads;

        let shared = Arc::new(PoolShared {
            config,
            queue,
            workers: Mutex::new(WorkerRegistry::default()),
            spawner,
            monitor,
            dispatch: logging::current_subscriber(),
            shutdown_lock: Mutex::new(()),
        });

        for _ in 0..min_threads {
            let reserved = shared.try_reserve_worker(&mut shared.queue.lock());
            if reserved {
                shared.start_reserved_worker();
            }
        }

        crate::log_pool!(
            shared.name(),
            "created",
            min_threads,
            max_threads = ?shared.config.max_threads,
            idle_timeout_ms = shared.config.idle_timeout.as_millis() as u64
        );

        Self { shared }
    }

    /// Queues `work` and grows the pool or wakes an idle worker.
    ///
    /// Fails with [`PoolError::ShutDown`] once `shutdown()` has started and with
    /// [`PoolError::QueueFull`] when a bounded queue is at capacity. The work's
    /// own outcome is never reported back here.
    pub fn submit<W: Work>(&self, work: W) -> PoolResult<()> {
        self.submit_boxed(Box::new(work))
    }

    pub fn submit_boxed(&self, work: BoxedWork) -> PoolResult<()> {
        let shared = &self.shared;
        let mut state = shared.queue.lock();
        if state.shut_down {
            return Err(PoolError::ShutDown);
        }
        if let Some(capacity) = shared.config.max_pending {
            if state.pending() >= capacity {
                return Err(PoolError::QueueFull { capacity });
            }
        }

        let pending = shared.queue.enqueue(&mut state, work);
        let grow = state.available_threads < pending && shared.try_reserve_worker(&mut state);
        drop(state);

        if grow {
            shared.start_reserved_worker();
        } else {
            shared.queue.notify_one();
        }
        Ok(())
    }

    /// Convenience for closures that cannot fail.
    pub fn execute<F>(&self, f: F) -> PoolResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(move || {
            f();
            Ok::<(), anyhow::Error>(())
        })
    }

    /// Stops every worker and waits for all of them to terminate.
    ///
    /// Idle workers are woken immediately; a worker in the middle of an item
    /// finishes that item first. Items still queued are discarded. Safe to call
    /// more than once; later calls return once the first one has finished.
    ///
    /// Must not be called from work running on this same pool, since the
    /// calling worker would wait on itself.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let _serial = shared
            .shutdown_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let first = {
            let mut state = shared.queue.lock();
            !mem::replace(&mut state.shut_down, true)
        };
        if first {
            crate::log_pool!(shared.name(), "shutting_down");
        }
        shared.queue.notify_all();

        loop {
            let (live, finished) = {
                let mut registry = shared.lock_workers();
                let live: Vec<Arc<WorkerHandle>> = registry.live.values().cloned().collect();
                (live, mem::take(&mut registry.finished))
            };

            if live.is_empty() && finished.is_empty() {
                // A worker reserved just before the shutdown mark may still be
                // on its way into the registry.
                if shared.queue.lock().creating_worker {
                    thread::yield_now();
                    continue;
                }
                break;
            }

            for handle in &live {
                handle.close(&shared.queue);
            }
            for handle in live {
                if let Some(thread) = handle.take_thread() {
                    join_worker(shared.name(), handle.name(), thread);
                }
            }
            for thread in finished {
                join_worker(shared.name(), "retired", thread);
            }
        }

        let (discarded, snapshot) = {
            let mut state = shared.queue.lock();
            let discarded: VecDeque<_> = mem::take(&mut state.items);
            (discarded, state.snapshot())
        };
        if !discarded.is_empty() {
            warn!(pool = %shared.name(), discarded = discarded.len(), "discarding queued work at shutdown");
        }
        drop(discarded);

        if snapshot.current_threads != 0 {
            warn!(
                pool = %shared.name(),
                current_threads = snapshot.current_threads,
                "thread count did not drain to zero after shutdown"
            );
        }

        if first {
            crate::log_pool!(shared.name(), "shut_down", processed = snapshot.processed_count);
            shared.emit_with(PoolEvent::ShutdownComplete, snapshot);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.lock().shut_down
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn config(&self) -> &ThreadPoolConfig {
        &self.shared.config
    }

    pub fn min_threads(&self) -> usize {
        self.shared.config.min_threads
    }

    /// `None` for an unbounded pool.
    pub fn max_threads(&self) -> Option<usize> {
        self.shared.config.max_threads
    }

    pub fn is_bounded(&self) -> bool {
        self.shared.config.is_bounded()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.shared.config.idle_timeout
    }

    pub fn idle_policy(&self) -> IdlePolicy {
        self.shared.config.idle_policy
    }

    /// Always 1: a pool has exactly one work queue.
    pub fn number_of_work_queues(&self) -> usize {
        1
    }

    /// The pool's work queue; only index 0 exists.
    pub fn work_queue(&self, index: usize) -> PoolResult<&WorkQueue> {
        match index {
            0 => Ok(&self.shared.queue),
            _ => Err(PoolError::NoSuchWorkQueue(index)),
        }
    }

    pub fn current_thread_count(&self) -> usize {
        self.shared.queue.lock().current_threads
    }

    pub fn available_thread_count(&self) -> usize {
        self.shared.queue.lock().available_threads
    }

    pub fn busy_thread_count(&self) -> usize {
        self.shared.queue.lock().busy_threads()
    }

    /// Items completed so far, failed ones included.
    pub fn processed_count(&self) -> u64 {
        self.shared.queue.lock().completed()
    }

    pub fn failed_count(&self) -> u64 {
        self.shared.queue.lock().failed_count
    }

    /// `0` until the first item completes.
    pub fn average_completion_time_millis(&self) -> u64 {
        self.shared.queue.lock().average_completion_time_millis()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().pending()
    }

    /// All counters from a single critical section.
    pub fn snapshot(&self) -> PoolSnapshot {
        self.shared.queue.lock().snapshot()
    }
}

impl PoolStatistics for ThreadPool {
    fn current_thread_count(&self) -> usize {
        ThreadPool::current_thread_count(self)
    }

    fn available_thread_count(&self) -> usize {
        ThreadPool::available_thread_count(self)
    }

    fn busy_thread_count(&self) -> usize {
        ThreadPool::busy_thread_count(self)
    }

    fn processed_count(&self) -> u64 {
        ThreadPool::processed_count(self)
    }

    fn average_completion_time_millis(&self) -> u64 {
        ThreadPool::average_completion_time_millis(self)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Joins one worker thread. A join error means the thread panicked outside the
/// per-item guard; it is terminated either way, so the error is only logged.
pub(crate) fn join_worker(pool: &str, worker: &str, thread: JoinHandle<()>) {
    if let Err(payload) = thread.join() {
        let err = corral_api::WorkError::from_panic(payload);
        crate::log_error!(err, pool = %pool, worker = %worker, "worker thread panicked");
    }
}
