use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use corral_api::{BoxedWork, PoolSnapshot};
use tracing::warn;

/// A work item together with the instant it entered the queue.
pub(crate) struct QueuedWork {
    pub(crate) work: BoxedWork,
    pub(crate) enqueued_at: Instant,
}

/// Result of a blocking [`WorkQueue::dequeue`].
pub(crate) enum Dequeued {
    /// The head of the queue, now owned by the caller.
    Work(QueuedWork),
    /// Nothing arrived within the timeout.
    TimedOut,
    /// The worker or the whole pool was asked to stop.
    Closed,
}

/// Everything guarded by the pool's single lock: the buffered items, the
/// pool's thread counters and the queue statistics.
///
/// `processed_count` starts at 1 so the average completion time can always be
/// computed by plain division.
pub(crate) struct PoolState {
    pub(crate) items: VecDeque<QueuedWork>,
    pub(crate) current_threads: usize,
    pub(crate) available_threads: usize,
    pub(crate) processed_count: u64,
    pub(crate) failed_count: u64,
    pub(crate) total_time_taken: Duration,
    pub(crate) creating_worker: bool,
    pub(crate) shut_down: bool,
    pub(crate) total_work_items_added: u64,
    pub(crate) work_items_dequeued: u64,
    pub(crate) total_time_in_queue: Duration,
}

impl PoolState {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            current_threads: 0,
            available_threads: 0,
            processed_count: 1,
            failed_count: 0,
            total_time_taken: Duration::ZERO,
            creating_worker: false,
            shut_down: false,
            total_work_items_added: 0,
            work_items_dequeued: 0,
            total_time_in_queue: Duration::ZERO,
        }
    }

    fn take_next(&mut self) -> Option<QueuedWork> {
        let item = self.items.pop_front()?;
        self.work_items_dequeued += 1;
        self.total_time_in_queue += item.enqueued_at.elapsed();
        Some(item)
    }

    pub(crate) fn pending(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn busy_threads(&self) -> usize {
        self.current_threads.saturating_sub(self.available_threads)
    }

    /// Completed items, without the initial 1 used as the divisor seed.
    pub(crate) fn completed(&self) -> u64 {
        self.processed_count - 1
    }

    pub(crate) fn average_completion_time_millis(&self) -> u64 {
        self.total_time_taken.as_millis() as u64 / self.processed_count
    }

    pub(crate) fn average_time_in_queue_millis(&self) -> u64 {
        match self.work_items_dequeued {
            0 => 0,
            n => self.total_time_in_queue.as_millis() as u64 / n,
        }
    }

    pub(crate) fn record_completion(&mut self, elapsed: Duration, failed: bool) {
        self.total_time_taken += elapsed;
        self.processed_count += 1;
        if failed {
            self.failed_count += 1;
        }
    }

    pub(crate) fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            current_threads: self.current_threads,
            available_threads: self.available_threads,
            busy_threads: self.busy_threads(),
            processed_count: self.completed(),
            failed_count: self.failed_count,
            average_completion_time_ms: self.average_completion_time_millis(),
            pending_items: self.pending(),
            total_work_items_added: self.total_work_items_added,
            average_time_in_queue_ms: self.average_time_in_queue_millis(),
        }
    }
}

/// The pool's FIFO of pending work.
///
/// The queue owns the one mutex that also guards the pool's counters, so a
/// single critical section can enqueue an item and decide whether the pool has
/// to grow. Workers block in [`dequeue`](Self::dequeue) on a condition variable;
/// the lock is released for the duration of the wait.
pub struct WorkQueue {
    name: String,
    state: Mutex<PoolState>,
    work_available: Condvar,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("pending", &self.work_items_in_queue())
            .finish()
    }
}

impl WorkQueue {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(PoolState::new()),
            work_available: Condvar::new(),
        }
    }

    /// Locks the shared state.
    ///
    /// Work never runs under this lock, so a poisoned mutex only means a panic
    /// in pool bookkeeping; the state is still consistent enough to drain and
    /// shut down, so the poison is logged and ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(queue = %self.name, "work queue lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Appends `work` to the tail. The caller holds the lock and decides who
    /// to wake. Returns the new pending count.
    pub(crate) fn enqueue(&self, state: &mut PoolState, work: BoxedWork) -> usize {
        state.items.push_back(QueuedWork {
            work,
            enqueued_at: Instant::now(),
        });
        state.total_work_items_added += 1;
        state.items.len()
    }

    /// Waits up to `timeout` for an item.
    ///
    /// The caller counts as an available worker for the whole wait. `closed`
    /// and the pool-wide shutdown mark are checked before every attempt, so a
    /// close request wins over pending work. A timeout too large to add to the
    /// current instant never expires.
    pub(crate) fn dequeue(&self, timeout: Duration, closed: &AtomicBool) -> Dequeued {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        state.available_threads += 1;

        let outcome = loop {
            if closed.load(Ordering::Acquire) || state.shut_down {
                break Dequeued::Closed;
            }
            if let Some(item) = state.take_next() {
                break Dequeued::Work(item);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break Dequeued::TimedOut;
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            state = self.wait_for_work(state, remaining);
        };

        state.available_threads = state.available_threads.saturating_sub(1);
        outcome
    }

    /// Blocks on the condvar, for at most `timeout` when given.
    ///
    /// Spurious and poisoned wakeups return normally; the caller re-checks and
    /// re-waits for whatever is left of its deadline.
    fn wait_for_work<'a>(
        &'a self,
        state: MutexGuard<'a, PoolState>,
        timeout: Option<Duration>,
    ) -> MutexGuard<'a, PoolState> {
        let woken = match timeout {
            Some(timeout) => self
                .work_available
                .wait_timeout(state, timeout)
                .map(|(guard, _)| guard)
                .map_err(|poisoned| PoisonError::new(poisoned.into_inner().0)),
            None => self.work_available.wait(state),
        };
        woken.unwrap_or_else(|poisoned| {
            warn!(queue = %self.name, "wait on work queue interrupted by poisoned lock");
            poisoned.into_inner()
        })
    }

    pub(crate) fn notify_one(&self) {
        self.work_available.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.work_available.notify_all();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items currently buffered.
    pub fn pending_count(&self) -> usize {
        self.lock().pending()
    }

    /// Alias of [`pending_count`](Self::pending_count).
    pub fn work_items_in_queue(&self) -> usize {
        self.pending_count()
    }

    /// Items ever added to this queue.
    pub fn total_work_items_added(&self) -> u64 {
        self.lock().total_work_items_added
    }

    /// Mean time an item waited before a worker picked it up.
    pub fn average_time_in_queue_millis(&self) -> u64 {
        self.lock().average_time_in_queue_millis()
    }
}
