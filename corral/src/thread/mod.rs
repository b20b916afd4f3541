//! # Thread Pools
//!
//! Worker thread pools that share one FIFO work queue per pool.
//!
//! ## Key Concepts
//! - [`ThreadPool`]: bounded (`min..=max` threads) or unbounded; grows on
//!   submit when pending items outnumber idle workers
//! - [`WorkQueue`]: the pool's queue, which also guards the pool counters
//! - Workers: OS threads created through a [`WorkerSpawner`], idling up to the
//!   configured timeout between items
//! - [`ThreadPoolManager`]: named registry of pools with a default pool at id 0
//!
//! ## Design Principles
//! - Work items are independent; the pool never reports their outcome back
//!   to the submitter, only to the log and an optional monitor
//! - Statistics are read under the same lock that updates them
//! - `shutdown()` closes and joins every worker before it returns

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod pool;
pub mod queue;
pub mod worker;

pub use config::{IdlePolicy, ThreadPoolConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_POOL_NAME};
pub use error::{PoolError, PoolResult};
pub use manager::ThreadPoolManager;
pub use monitor::LoggingMonitor;
pub use pool::ThreadPool;
pub use queue::WorkQueue;
pub use worker::{OsThreadSpawner, WorkerBody, WorkerSpawner};
