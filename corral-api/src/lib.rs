//! # Corral Thread Pool API
//!
//! Corral is a worker thread pool built around a single shared work queue.
//! This crate holds the abstract contracts shared between the pool
//! implementation and the code around it: the unit of work producers hand to a
//! pool, and the read-only monitoring facade an observability collaborator
//! consumes.
//!
//! ## Core Components
//!
//! - **Work**: an opaque, one-shot unit of executable work
//! - **Monitoring facade**: pull-style statistics ([`PoolStatistics`]) and a
//!   push-style sink ([`PoolMonitor`]) fed with [`PoolSnapshot`]s
//! - **Errors**: the failure taxonomy of a single work execution
//!
//! ## Usage Example
//!
//! ```rust
//! use corral_api::{Work, WorkError};
//!
//! struct Reindex { shard: u32 }
//!
//! impl Work for Reindex {
//!     fn do_work(self: Box<Self>) -> anyhow::Result<()> {
//!         anyhow::ensure!(self.shard < 64, "unknown shard {}", self.shard);
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "reindex"
//!     }
//! }
//!
//! let work: Box<dyn Work> = Box::new(Reindex { shard: 99 });
//! let err = WorkError::from(work.do_work().unwrap_err());
//! assert!(err.to_string().contains("unknown shard"));
//! ```
//!
//! ## Module Organization
//!
//! - [`work`]: the `Work` trait and closure adapters
//! - [`monitor`]: statistics facade, snapshots and events
//! - [`errors`]: work execution errors

pub mod errors;
pub mod monitor;
pub mod work;

pub use errors::WorkError;
pub use monitor::{PoolEvent, PoolMonitor, PoolSnapshot, PoolStatistics};
pub use work::{BoxedWork, NamedWork, Work};
