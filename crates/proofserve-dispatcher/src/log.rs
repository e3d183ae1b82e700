//! Append-only verification log
//!
//! One JSON object per completed job, one job per line. The dispatcher only
//! ever writes this file.

use chrono::{DateTime, Utc};
use proofserve_checker::{JobId, VerificationJob, VerificationVerdict};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// A single line of the verification log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    pub proof_code: String,
    pub formal_statement: String,
    pub result: VerificationVerdict,
    /// Seconds from enqueue to verdict
    pub duration: f64,
}

impl LogRecord {
    pub fn new(job: &VerificationJob, verdict: &VerificationVerdict) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job.id,
            proof_code: job.proof_code.clone(),
            formal_statement: job.formal_statement.clone(),
            result: verdict.clone(),
            duration: job.queued_for().as_secs_f64(),
        }
    }
}

pub struct VerificationLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl VerificationLog {
    /// Open `path` for appending, creating it if needed
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line
    pub async fn append(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        // Whole line under the lock so concurrent workers never interleave
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofserve_checker::Diagnostic;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(n: u64) -> VerificationJob {
        VerificationJob::new(
            JobId(n),
            " by ring",
            "theorem t : 2 + 2 = 4 :=",
            "lake",
            ".",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_append_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.jsonl");
        let log = VerificationLog::open(&path).await.unwrap();

        let ok = VerificationVerdict::from_diagnostics(vec![], vec![], Duration::from_millis(250));
        let bad = VerificationVerdict::from_diagnostics(
            vec![],
            vec![Diagnostic::error("unsolved goals")],
            Duration::from_millis(10),
        );
        log.append(&LogRecord::new(&job(1), &ok)).await.unwrap();
        log.append(&LogRecord::new(&job(2), &bad)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["job_id"], 1);
        assert_eq!(first["proof_code"], " by ring");
        assert_eq!(first["formal_statement"], "theorem t : 2 + 2 = 4 :=");
        assert_eq!(first["result"]["success"], true);
        assert!(first["duration"].is_f64());
        assert!(first["timestamp"].as_str().unwrap().contains('T'));

        let second: LogRecord = serde_json::from_str(lines[1]).unwrap();
        assert!(!second.result.success);
        assert_eq!(second.result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.jsonl");
        let verdict = VerificationVerdict::from_diagnostics(vec![], vec![], Duration::ZERO);

        VerificationLog::open(&path)
            .await
            .unwrap()
            .append(&LogRecord::new(&job(1), &verdict))
            .await
            .unwrap();
        VerificationLog::open(&path)
            .await
            .unwrap()
            .append(&LogRecord::new(&job(2), &verdict))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.jsonl");
        let log = Arc::new(VerificationLog::open(&path).await.unwrap());

        let mut writers = Vec::new();
        for n in 0..32 {
            let log = Arc::clone(&log);
            writers.push(tokio::spawn(async move {
                let mut job = job(n);
                job.proof_code = "x".repeat(4096);
                let verdict = VerificationVerdict::from_diagnostics(vec![], vec![], Duration::ZERO);
                log.append(&LogRecord::new(&job, &verdict)).await.unwrap();
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let mut ids: Vec<u64> = text
            .lines()
            .map(|line| serde_json::from_str::<LogRecord>(line).unwrap().job_id.0)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..32).collect::<Vec<_>>());
    }
}
