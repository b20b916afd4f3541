use thiserror::Error;

/// Errors reported to callers of the pool and the pool manager.
///
/// Failures of individual work items are not part of this type; see
/// `corral_api::WorkError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid thread pool configuration: {0}")]
    InvalidConfig(String),
    #[error("Thread pool is shut down")]
    ShutDown,
    #[error("Work queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },
    #[error("No work queue at index {0}")]
    NoSuchWorkQueue(usize),
    #[error("Thread pool not found: {0}")]
    NoSuchThreadPool(String),
    #[error("Thread pool already exists: {0}")]
    PoolAlreadyExists(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
