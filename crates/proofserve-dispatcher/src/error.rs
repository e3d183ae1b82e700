//! Dispatcher errors
//!
//! These are system faults only. A proof that fails, a checker that times out
//! or crashes: all of those are verdicts, never a `DispatchError`.

use crate::store::StoreError;
use proofserve_checker::JobId;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Backpressure rejection; the job was never queued
    #[error("task queue is full ({capacity} jobs pending)")]
    QueueFull { capacity: usize },

    /// The dispatcher no longer accepts jobs
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The submitter stopped waiting before the verdict arrived
    #[error("{id} exceeded its deadline after {waited:?}")]
    DeadlineExceeded { id: JobId, waited: Duration },

    /// Result store invariant violated
    #[error("result store error: {0}")]
    Store(#[from] StoreError),

    /// Verification log could not be opened
    #[error("verification log error: {0}")]
    Log(#[from] std::io::Error),
}

impl DispatchError {
    /// Stable snake_case label for responses and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::QueueFull { .. } => "queue_full",
            DispatchError::ShuttingDown => "shutting_down",
            DispatchError::DeadlineExceeded { .. } => "deadline_exceeded",
            DispatchError::Store(_) => "store_error",
            DispatchError::Log(_) => "log_error",
        }
    }
}
