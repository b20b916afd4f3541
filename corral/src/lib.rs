// Corral Thread Pools
//
// Bounded and unbounded worker thread pools with a single shared work queue.
// The abstract contracts (work items, monitors, statistics) live in
// `corral-api`; this crate provides the implementation and logging setup.

pub mod logging;
pub mod thread;

// Re-export commonly used types
pub use corral_api::{
    BoxedWork, NamedWork, PoolEvent, PoolMonitor, PoolSnapshot, PoolStatistics, Work, WorkError,
};
pub use thread::{
    IdlePolicy, LoggingMonitor, OsThreadSpawner, PoolError, PoolResult, ThreadPool,
    ThreadPoolConfig, ThreadPoolManager, WorkQueue, WorkerSpawner,
};
