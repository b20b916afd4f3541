//! # Work Execution Errors
//!
//! Failures that can happen while a worker runs a single work item. They never
//! reach the producer: the pool logs them, counts them and moves on to the next
//! item.

use std::any::Any;

use thiserror::Error;

/// Outcome of a work item that did not complete successfully.
#[derive(Error, Debug)]
pub enum WorkError {
    /// The work returned an error.
    #[error("Work failed: {0}")]
    Failed(#[from] anyhow::Error),

    /// The work panicked. Holds the panic payload when it was a string.
    #[error("Work panicked: {0}")]
    Panicked(String),
}

impl WorkError {
    /// Builds a [`WorkError::Panicked`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "Unknown panic".to_string()
        };
        WorkError::Panicked(message)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, WorkError::Panicked(_))
    }
}
