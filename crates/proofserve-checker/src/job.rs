//! Verification jobs routed through the dispatch queue

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Default arguments passed to the checker binary (`lake exe repl`)
pub const DEFAULT_CHECKER_ARGS: &[&str] = &["exe", "repl"];

/// Opaque job identifier, unique for the lifetime of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// One verification request, immutable once enqueued
#[derive(Debug, Clone)]
pub struct VerificationJob {
    /// Identifier used to key the result store
    pub id: JobId,
    /// Candidate proof body appended to the statement
    pub proof_code: String,
    /// Target statement (trimmed before concatenation)
    pub formal_statement: String,
    /// Checker executable (e.g. `lake`)
    pub checker_path: PathBuf,
    /// Arguments passed to the checker executable
    pub checker_args: Vec<String>,
    /// Project directory the checker runs in
    pub workspace_path: PathBuf,
    /// Wall-clock budget for the checker process
    pub timeout: Duration,
    /// When the job entered the queue
    pub enqueued_at: Instant,
}

impl VerificationJob {
    /// Create a job with the default `exe repl` argument vector
    pub fn new(
        id: JobId,
        proof_code: impl Into<String>,
        formal_statement: impl Into<String>,
        checker_path: impl Into<PathBuf>,
        workspace_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            proof_code: proof_code.into(),
            formal_statement: formal_statement.into(),
            checker_path: checker_path.into(),
            checker_args: DEFAULT_CHECKER_ARGS.iter().map(|s| (*s).to_string()).collect(),
            workspace_path: workspace_path.into(),
            timeout,
            enqueued_at: Instant::now(),
        }
    }

    /// Replace the checker argument vector
    pub fn with_checker_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checker_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Full source sent to the checker: trimmed statement followed by the proof
    pub fn full_source(&self) -> String {
        let statement = self.formal_statement.trim();
        let mut source = String::with_capacity(statement.len() + self.proof_code.len());
        source.push_str(statement);
        source.push_str(&self.proof_code);
        source
    }

    /// Proof text shortened for log lines
    pub fn proof_excerpt(&self) -> String {
        truncate_for_log(&self.proof_code, 120)
    }

    /// Time spent since the job was enqueued
    pub fn queued_for(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(statement: &str, proof: &str) -> VerificationJob {
        VerificationJob::new(
            JobId(7),
            proof,
            statement,
            "lake",
            "/tmp",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(42).to_string(), "job-42");
    }

    #[test]
    fn test_full_source_trims_statement_only() {
        let job = make_job("  theorem t : 2 + 2 = 4 :=\n\n", " by ring\n");
        assert_eq!(job.full_source(), "theorem t : 2 + 2 = 4 := by ring\n");
    }

    #[test]
    fn test_default_checker_args() {
        let job = make_job("theorem t : True :=", " trivial");
        assert_eq!(job.checker_args, vec!["exe", "repl"]);

        let job = job.with_checker_args(Vec::<String>::new());
        assert!(job.checker_args.is_empty());
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc…");
        // Multi-byte characters are counted as characters, not bytes
        assert_eq!(truncate_for_log("ℝℝℝℝ", 2), "ℝℝ…");
    }
}
