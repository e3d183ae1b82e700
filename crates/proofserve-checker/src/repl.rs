//! Lean REPL checker invoker
//!
//! Runs `<checker_path> <checker_args...>` (by default `lake exe repl`) inside
//! the job's workspace, feeds it one protocol request on stdin and turns
//! whatever comes back into a [`VerificationVerdict`].

use crate::job::{truncate_for_log, VerificationJob};
use crate::process::{isolate_process_group, ChildGuard};
use crate::protocol::{ReplCommand, ReplResponse};
use crate::traits::{Checker, HealthStatus};
use crate::verdict::{FailureReason, VerificationVerdict};
use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Errors from a single checker invocation
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Checker binary could not be started
    #[error("failed to spawn checker {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Request could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// Pipe or wait failure while talking to the checker
    #[error("checker I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Checker exceeded its time budget
    #[error("checker timed out after {0:?}")]
    Timeout(Duration),

    /// Checker exited without writing anything to stdout
    #[error("checker produced no output ({status}): {stderr}")]
    NoOutput { status: String, stderr: String },

    /// Stdout was not a protocol response
    #[error("malformed checker output ({error}): {excerpt}")]
    Malformed {
        #[source]
        error: serde_json::Error,
        excerpt: String,
    },
}

impl InvokeError {
    /// Verdict category for this error
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            InvokeError::Timeout(_) => FailureReason::Timeout,
            InvokeError::Malformed { .. } => FailureReason::MalformedOutput,
            InvokeError::Spawn { .. }
            | InvokeError::Encode(_)
            | InvokeError::Io(_)
            | InvokeError::NoOutput { .. } => FailureReason::ProcessError,
        }
    }
}

/// Configuration for the REPL checker
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Checker binary probed by `health_check`
    pub checker_path: Option<PathBuf>,
    /// Workspace probed by `health_check`
    pub workspace_path: Option<PathBuf>,
    /// Run at most one checker per workspace directory at a time
    pub serialize_workspace: bool,
    /// Characters of stderr/stdout kept in failure details
    pub excerpt_chars: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            checker_path: None,
            workspace_path: None,
            serialize_workspace: false,
            excerpt_chars: 500,
        }
    }
}

impl ReplConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the checker/workspace pair used for health probes
    pub fn with_probe(mut self, checker: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        self.checker_path = Some(checker.into());
        self.workspace_path = Some(workspace.into());
        self
    }

    /// Serialize jobs that share a workspace directory
    pub fn with_serialized_workspace(mut self, enabled: bool) -> Self {
        self.serialize_workspace = enabled;
        self
    }
}

/// Captured result of a checker run that exited on its own
#[derive(Debug)]
pub struct RawOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Checker invoker speaking the Lean REPL protocol
pub struct ReplChecker {
    config: ReplConfig,
    workspace_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl Default for ReplChecker {
    fn default() -> Self {
        Self::new(ReplConfig::default())
    }
}

impl ReplChecker {
    pub fn new(config: ReplConfig) -> Self {
        Self {
            config,
            workspace_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    fn workspace_lock(&self, workspace: &Path) -> Arc<Mutex<()>> {
        self.workspace_locks
            .entry(workspace.to_path_buf())
            .or_default()
            .clone()
    }

    /// Run the checker and parse its response, without building a verdict
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn invoke(&self, job: &VerificationJob) -> Result<ReplResponse, InvokeError> {
        let _workspace_guard = if self.config.serialize_workspace {
            Some(self.workspace_lock(&job.workspace_path).lock_owned().await)
        } else {
            None
        };

        let output = self.run(job).await?;
        self.interpret(&output)
    }

    /// Spawn the checker, exchange one request, and always leave it dead
    async fn run(&self, job: &VerificationJob) -> Result<RawOutput, InvokeError> {
        let payload = ReplCommand::new(job.full_source())
            .encode()
            .map_err(InvokeError::Encode)?;

        let mut cmd = Command::new(&job.checker_path);
        cmd.args(&job.checker_args)
            .current_dir(&job.workspace_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);

        let child = cmd.spawn().map_err(|source| InvokeError::Spawn {
            path: job.checker_path.display().to_string(),
            source,
        })?;
        let mut guard = ChildGuard::with_process_group(child);
        debug!(pid = ?guard.pid(), checker = %job.checker_path.display(), "Checker started");

        let result = tokio::time::timeout(job.timeout, exchange(&mut guard, payload.as_bytes())).await;
        guard.terminate().await;
        match result {
            Ok(output) => output,
            Err(_) => Err(InvokeError::Timeout(job.timeout)),
        }
    }

    fn interpret(&self, output: &RawOutput) -> Result<ReplResponse, InvokeError> {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvokeError::NoOutput {
                status: output.status.to_string(),
                stderr: truncate_for_log(stderr.trim(), self.config.excerpt_chars),
            });
        }

        // A parseable response is honored whatever the exit status says
        ReplResponse::parse(&stdout).map_err(|error| InvokeError::Malformed {
            error,
            excerpt: truncate_for_log(stdout.trim(), self.config.excerpt_chars),
        })
    }
}

/// Write the request, drain both pipes, and reap the child
async fn exchange(guard: &mut ChildGuard, payload: &[u8]) -> Result<RawOutput, InvokeError> {
    let child = guard.child_mut();
    let missing = |name: &str| io::Error::new(io::ErrorKind::Other, format!("checker {name} not captured"));
    let mut stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let mut stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let mut stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let write = async move {
        // A checker that exits without reading its input is judged by its output
        match stdin.write_all(payload).await {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
        // stdin is dropped here, closing the pipe
    };
    let read_stdout = async {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await.map(|_| buf)
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await.map(|_| buf)
    };

    let ((), stdout, stderr) = tokio::try_join!(write, read_stdout, read_stderr)?;
    let status = guard.wait().await?;
    Ok(RawOutput {
        status,
        stdout,
        stderr,
    })
}

#[async_trait]
impl Checker for ReplChecker {
    fn name(&self) -> &str {
        "lean-repl"
    }

    async fn check(&self, job: &VerificationJob) -> VerificationVerdict {
        let start = Instant::now();
        match self.invoke(job).await {
            Ok(response) => {
                let (sorries, errors) = response.into_parts();
                VerificationVerdict::from_diagnostics(sorries, errors, start.elapsed())
            }
            Err(e) => {
                let reason = e.failure_reason();
                debug!(job_id = %job.id, %reason, error = %e, "Checker invocation failed");
                VerificationVerdict::failure(reason, e.to_string(), start.elapsed())
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        let Some(checker) = self.config.checker_path.clone() else {
            return HealthStatus::Unavailable {
                reason: "no checker path configured".to_string(),
            };
        };
        let workspace = self.config.workspace_path.clone();
        // PATH lookup and stat hit the filesystem
        tokio::task::spawn_blocking(move || probe(&checker, workspace.as_deref()))
            .await
            .unwrap_or_else(|e| HealthStatus::Unavailable {
                reason: format!("health probe failed: {e}"),
            })
    }
}

fn probe(checker: &Path, workspace: Option<&Path>) -> HealthStatus {
    if let Err(e) = which::which(checker) {
        return HealthStatus::Unavailable {
            reason: format!("checker {} not executable: {e}", checker.display()),
        };
    }
    match workspace {
        Some(workspace) if !workspace.is_dir() => HealthStatus::Unavailable {
            reason: format!("workspace {} is not a directory", workspace.display()),
        },
        _ => HealthStatus::Healthy,
    }
}
