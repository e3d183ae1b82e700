//! The seam between the worker pool and a concrete checker

use crate::job::VerificationJob;
use crate::verdict::VerificationVerdict;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Availability of a checker installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unavailable { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Runs one job to a verdict.
///
/// Implementations must not fail: every problem (timeout, crash, garbage
/// output) is reported inside the returned verdict. They must also leave no
/// child process behind when the returned future completes.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Check a job and normalize the outcome
    async fn check(&self, job: &VerificationJob) -> VerificationVerdict;

    /// Probe whether the checker can run at all
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}
