//! # Monitoring Facade
//!
//! The read-only surface a pool exposes to an observability collaborator. The
//! collaborator itself (metrics export, dashboards) lives elsewhere; a pool only
//! has to keep these numbers consistent and lock-protected.
//!
//! Two styles are supported:
//!
//! - **Pull**: poll any [`PoolStatistics`] implementor.
//! - **Push**: install a [`PoolMonitor`]; the pool calls it with a
//!   [`PoolEvent`] and a fresh [`PoolSnapshot`] whenever something notable
//!   happens. Implementations must be cheap and must not call back into the
//!   pool's mutating operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a pool's counters, taken under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Live worker threads (including those reserved but still starting).
    pub current_threads: usize,
    /// Workers currently blocked waiting for work.
    pub available_threads: usize,
    /// Workers currently executing work.
    pub busy_threads: usize,
    /// Work items completed, successfully or not.
    pub processed_count: u64,
    /// Work items that returned an error or panicked.
    pub failed_count: u64,
    /// Mean wall-clock execution time per processed item.
    pub average_completion_time_ms: u64,
    /// Items waiting in the queue.
    pub pending_items: usize,
    /// Items ever added to the queue.
    pub total_work_items_added: u64,
    /// Mean time an item spent queued before a worker picked it up.
    pub average_time_in_queue_ms: u64,
}

/// Something that happened inside a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    /// A worker thread started.
    WorkerStarted { worker: String },
    /// A worker thread stopped, either closed or retired after idling.
    WorkerExited { worker: String, retired: bool },
    /// Spawning a worker thread failed.
    WorkerCreationFailed { reason: String },
    /// A work item finished successfully.
    WorkCompleted { work: String, elapsed_ms: u64 },
    /// A work item returned an error or panicked.
    WorkFailed { work: String, error: String },
    /// `shutdown()` finished joining every worker.
    ShutdownComplete,
}

/// Push-style monitoring sink.
pub trait PoolMonitor: fmt::Debug + Send + Sync {
    /// Called by the pool with no pool lock held.
    fn on_event(&self, pool: &str, event: &PoolEvent, snapshot: &PoolSnapshot);
}

/// Pull-style statistics exposed by a pool.
///
/// Every accessor takes its own snapshot; two consecutive calls may observe
/// different states. Use a full [`PoolSnapshot`] when the numbers have to agree
/// with each other.
pub trait PoolStatistics {
    /// Number of worker threads the pool currently accounts for.
    fn current_thread_count(&self) -> usize;

    /// Number of workers idle and waiting for work.
    fn available_thread_count(&self) -> usize;

    /// `current - available`.
    fn busy_thread_count(&self) -> usize {
        self.current_thread_count()
            .saturating_sub(self.available_thread_count())
    }

    /// Work items completed so far.
    fn processed_count(&self) -> u64;

    /// Mean execution time per item in milliseconds; `0` before any work ran.
    fn average_completion_time_millis(&self) -> u64;
}
