// Crate-level lint configuration for pedantic clippy
#![allow(clippy::must_use_candidate)] // Builder methods and getters don't need must_use
#![allow(clippy::missing_errors_doc)] // Error variants are documented on the enums
#![allow(clippy::module_name_repetitions)] // ReplChecker, ReplConfig read better unprefixed
#![allow(clippy::return_self_not_must_use)] // Builder pattern doesn't need must_use

//! Checker invocation for proofserve
//!
//! This crate owns everything that happens to a single verification job once a
//! worker has picked it up:
//!
//! - **VerificationJob / VerificationVerdict**: the data handed to and returned
//!   from a checker
//! - **protocol**: the Lean REPL request/response codec
//! - **Checker**: the trait the worker pool calls, so tests can substitute
//!   in-process checkers
//! - **ReplChecker**: the production invoker that runs `lake exe repl` under a
//!   timeout and guarantees the child is gone before returning
//!
//! # Example
//!
//! ```rust,no_run
//! use proofserve_checker::{Checker, JobId, ReplChecker, VerificationJob};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let job = VerificationJob::new(
//!     JobId(1),
//!     " by ring",
//!     "import Mathlib\ntheorem t : 2 + 2 = 4 :=",
//!     "lake",
//!     "/opt/lean/workspace",
//!     Duration::from_secs(300),
//! );
//! let verdict = ReplChecker::default().check(&job).await;
//! println!("success = {}", verdict.success);
//! # }
//! ```

pub mod job;
pub mod process;
pub mod protocol;
pub mod repl;
pub mod traits;
pub mod verdict;

pub use job::{truncate_for_log, JobId, VerificationJob, DEFAULT_CHECKER_ARGS};
pub use process::ChildGuard;
pub use protocol::{ReplCommand, ReplResponse, REQUEST_DELIMITER};
pub use repl::{InvokeError, RawOutput, ReplChecker, ReplConfig};
pub use traits::{Checker, HealthStatus};
pub use verdict::{Diagnostic, FailureReason, VerificationVerdict, ERROR_SEVERITY};
