// Crate-level lint configuration for pedantic clippy
#![allow(clippy::must_use_candidate)] // Builder methods and getters don't need must_use
#![allow(clippy::missing_errors_doc)] // Error variants are documented on the enums
#![allow(clippy::module_name_repetitions)] // DispatchError, DispatcherConfig are clearer with prefix
#![allow(clippy::cast_possible_truncation)] // Millisecond log fields fit in u64
#![allow(clippy::return_self_not_must_use)] // Builder pattern doesn't need must_use

//! Verification dispatch engine
//!
//! Runs verification jobs on a fixed pool of workers and lets any number of
//! async submitters wait for their own verdicts:
//!
//! ```text
//! submit ──► TaskQueue ──► worker 1..N ──► Checker ──► ResultStore ──► submit returns
//! ```
//!
//! - [`TaskQueue`]: bounded FIFO with reject-or-wait backpressure
//! - [`ResultStore`]: per-job slot that wakes the waiting submitter
//! - [`Dispatcher`]: starts the pool, accepts requests, shuts down cleanly
//! - [`VerificationLog`]: optional JSON-lines record of every completed job
//! - [`reward`]: score model completions by extracting and checking their proof
//!
//! # Example
//!
//! ```rust,no_run
//! use proofserve_dispatcher::{Dispatcher, DispatcherConfig, VerificationRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), proofserve_dispatcher::DispatchError> {
//! let config = DispatcherConfig::new()
//!     .with_max_workers(8)
//!     .with_workspace("/opt/lean/workspace");
//! let dispatcher = Dispatcher::with_repl_checker(config).await?;
//!
//! let verdict = dispatcher
//!     .submit(
//!         VerificationRequest::new(" by ring", "import Mathlib\ntheorem t : 2 + 2 = 4 :=")
//!             .with_timeout(Duration::from_secs(60)),
//!     )
//!     .await?;
//! println!("proved: {}", verdict.success);
//!
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod log;
pub mod queue;
pub mod reward;
pub mod store;
mod worker;

pub use config::{DispatcherConfig, QueuePolicy};
pub use dispatcher::{Dispatcher, DispatcherStats, VerificationRequest};
pub use error::DispatchError;
pub use log::{LogRecord, VerificationLog};
pub use queue::TaskQueue;
pub use reward::{extract_proof, Reward, RewardConfig};
pub use store::{Delivery, ResultStore, StoreError, SweepStats};

// Re-export the checker-side types callers need alongside the dispatcher
pub use proofserve_checker::{
    Checker, Diagnostic, FailureReason, HealthStatus, JobId, VerificationJob, VerificationVerdict,
};
