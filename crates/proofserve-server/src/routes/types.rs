//! Request and response bodies for the proofserve HTTP API

use proofserve_dispatcher::{DispatchError, DispatcherStats, HealthStatus, JobId, VerificationVerdict};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// POST /verify body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Proof text appended to the statement
    pub code: String,
    pub formal_statement: String,
    /// Checker binary override
    #[serde(default)]
    pub lake_path: Option<PathBuf>,
    /// Checker workspace override
    #[serde(default)]
    pub lean_workspace: Option<PathBuf>,
    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub task_id: JobId,
    pub result: VerificationVerdict,
}

/// POST /score body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// Raw model completion containing a fenced Lean block
    pub completion: String,
    pub formal_statement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub score: f64,
    pub proof: Option<String>,
    pub result: Option<VerificationVerdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&DispatchError> for ErrorResponse {
    fn from(err: &DispatchError) -> Self {
        ErrorResponse::new(err.kind()).with_details(err.to_string())
    }
}

/// GET /health body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy", "degraded", "draining" or "unhealthy"
    pub status: String,
    /// "running", "draining" or "shutting_down"
    pub shutdown_state: String,
    pub checker: HealthStatus,
    /// False whenever new work should not be routed here
    pub ready: bool,
}

/// GET /stats body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub dispatcher: DispatcherStats,
    pub uptime_secs: f64,
}
