//! Dispatcher configuration

use proofserve_checker::DEFAULT_CHECKER_ARGS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What `enqueue` does when the task queue is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Fail immediately with `DispatchError::QueueFull`
    #[default]
    Reject,
    /// Suspend the submitter until a slot frees up
    Wait,
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuePolicy::Reject => f.write_str("reject"),
            QueuePolicy::Wait => f.write_str("wait"),
        }
    }
}

impl FromStr for QueuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(QueuePolicy::Reject),
            "wait" | "block" => Ok(QueuePolicy::Wait),
            other => Err(format!("unknown queue policy '{other}' (expected reject or wait)")),
        }
    }
}

/// Configuration for the [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound on worker count; the pool uses min(this, CPU count)
    pub max_workers: usize,
    /// Jobs that may wait in the queue at once
    pub queue_capacity: usize,
    /// Backpressure behavior when the queue is full
    pub queue_policy: QueuePolicy,
    /// Checker executable used when a request does not name one
    pub checker_path: PathBuf,
    /// Arguments passed to the checker executable
    pub checker_args: Vec<String>,
    /// Checker workspace used when a request does not name one
    pub workspace_path: PathBuf,
    /// Per-job timeout used when a request does not set one
    pub default_timeout: Duration,
    /// Extra time a submitter waits beyond the job timeout before giving up
    /// (`None` waits until the worker publishes)
    pub queue_wait_bound: Option<Duration>,
    /// Append one JSON line per completed job here
    pub log_path: Option<PathBuf>,
    /// Serialize jobs that share a workspace directory
    pub serialize_workspace: bool,
    /// Age after which uncollected verdicts are dropped by the sweeper
    pub stale_grace: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            max_workers: 64,
            queue_capacity: 1024,
            queue_policy: QueuePolicy::Reject,
            checker_path: PathBuf::from("lake"),
            checker_args: DEFAULT_CHECKER_ARGS.iter().map(|s| (*s).to_string()).collect(),
            workspace_path: PathBuf::from("."),
            default_timeout: Duration::from_secs(1200),
            queue_wait_bound: None,
            log_path: None,
            serialize_workspace: false,
            stale_grace: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workers actually started: min(max_workers, available CPUs), at least 1
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        self.max_workers.min(cpus).max(1)
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    /// Set the default checker executable and its arguments
    pub fn with_checker<I, S>(mut self, path: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checker_path = path.into();
        self.checker_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace_path = workspace.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_queue_wait_bound(mut self, bound: Duration) -> Self {
        self.queue_wait_bound = Some(bound);
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_serialized_workspace(mut self, enabled: bool) -> Self {
        self.serialize_workspace = enabled;
        self
    }

    /// Configure stale-result disposal
    pub fn with_sweep(mut self, grace: Duration, interval: Duration) -> Self {
        self.stale_grace = grace;
        self.sweep_interval = interval;
        self
    }
}
