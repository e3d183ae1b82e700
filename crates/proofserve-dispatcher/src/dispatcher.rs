//! Dispatch facade: start the pool, submit jobs, wait for verdicts

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::log::VerificationLog;
use crate::queue::TaskQueue;
use crate::store::ResultStore;
use crate::worker;
use proofserve_checker::{
    Checker, HealthStatus, JobId, ReplChecker, ReplConfig, VerificationJob, VerificationVerdict,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One proof to check; unset fields fall back to the dispatcher config
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub proof_code: String,
    pub formal_statement: String,
    pub checker_path: Option<PathBuf>,
    pub workspace_path: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl VerificationRequest {
    pub fn new(proof_code: impl Into<String>, formal_statement: impl Into<String>) -> Self {
        Self {
            proof_code: proof_code.into(),
            formal_statement: formal_statement.into(),
            checker_path: None,
            workspace_path: None,
            timeout: None,
        }
    }

    pub fn with_checker(mut self, path: impl Into<PathBuf>) -> Self {
        self.checker_path = Some(path.into());
        self
    }

    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Point-in-time counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub workers: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub pending_results: usize,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
}

/// State shared between the facade and the workers
pub(crate) struct Shared {
    pub(crate) queue: TaskQueue,
    pub(crate) store: Arc<ResultStore>,
    pub(crate) checker: Arc<dyn Checker>,
    pub(crate) log: Option<VerificationLog>,
    pub(crate) completed: AtomicU64,
}

/// Verification dispatch engine
///
/// Owns a fixed pool of workers fed from a bounded [`TaskQueue`] and a
/// [`ResultStore`] the submitters wait on. `submit` can be called from any
/// number of tasks at once; each call suspends only its own task.
pub struct Dispatcher {
    config: DispatcherConfig,
    shared: Arc<Shared>,
    worker_count: usize,
    next_id: AtomicU64,
    submitted: AtomicU64,
    rejected: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool and the stale-result sweeper
    pub async fn start(
        config: DispatcherConfig,
        checker: Arc<dyn Checker>,
    ) -> Result<Self, DispatchError> {
        let log = match &config.log_path {
            Some(path) => Some(VerificationLog::open(path).await?),
            None => None,
        };

        let store = Arc::new(ResultStore::new());
        let shared = Arc::new(Shared {
            queue: TaskQueue::new(config.queue_capacity, config.queue_policy),
            store: Arc::clone(&store),
            checker,
            log,
            completed: AtomicU64::new(0),
        });

        let worker_count = config.worker_count();
        let workers = (0..worker_count)
            .map(|index| tokio::spawn(worker::run(index, Arc::clone(&shared))))
            .collect();
        let sweeper = spawn_sweeper(store, config.stale_grace, config.sweep_interval);

        info!(
            workers = worker_count,
            queue_capacity = shared.queue.capacity(),
            queue_policy = %config.queue_policy,
            checker = shared.checker.name(),
            "Dispatcher started"
        );

        Ok(Self {
            config,
            shared,
            worker_count,
            next_id: AtomicU64::new(1),
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            workers: Mutex::new(workers),
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Start with the Lean REPL checker described by `config`
    pub async fn with_repl_checker(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let repl = ReplConfig::new()
            .with_probe(config.checker_path.clone(), config.workspace_path.clone())
            .with_serialized_workspace(config.serialize_workspace);
        Self::start(config, Arc::new(ReplChecker::new(repl))).await
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Check a proof and wait for its verdict
    ///
    /// Failing proofs, checker timeouts and checker crashes all come back as
    /// `Ok` verdicts. `Err` means the job was not accepted or the caller
    /// stopped waiting for it.
    pub async fn submit(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationVerdict, DispatchError> {
        self.submit_with_id(request).await.map(|(_, verdict)| verdict)
    }

    /// Like [`submit`](Self::submit), also returning the id the job ran under
    pub async fn submit_with_id(
        &self,
        request: VerificationRequest,
    ) -> Result<(JobId, VerificationVerdict), DispatchError> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);
        let job = VerificationJob::new(
            id,
            request.proof_code,
            request.formal_statement,
            request
                .checker_path
                .unwrap_or_else(|| self.config.checker_path.clone()),
            request
                .workspace_path
                .unwrap_or_else(|| self.config.workspace_path.clone()),
            timeout,
        )
        .with_checker_args(self.config.checker_args.iter().cloned());

        // One deadline covers both the wait for queue space and the wait for the verdict
        let max_wait = self
            .config
            .queue_wait_bound
            .map(|bound| timeout.saturating_add(bound));
        // Past the clock's range counts as no deadline
        let deadline = max_wait.and_then(|wait| Instant::now().checked_add(wait));
        let deadline_exceeded = |stage: &'static str| {
            let waited = max_wait.unwrap_or_default();
            warn!(job_id = %id, stage, waited_ms = waited.as_millis() as u64, "Deadline exceeded");
            DispatchError::DeadlineExceeded { id, waited }
        };

        let enqueued = match deadline {
            Some(at) => tokio::time::timeout_at(at, self.shared.queue.enqueue(job))
                .await
                .map_err(|_| deadline_exceeded("enqueue"))?,
            None => self.shared.queue.enqueue(job).await,
        };
        if let Err(err) = enqueued {
            if matches!(err, DispatchError::QueueFull { .. }) {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            warn!(job_id = %id, error = %err, "Job not accepted");
            return Err(err);
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let waiting = self.shared.store.await_and_take(id);
        let verdict = match deadline {
            Some(at) => tokio::time::timeout_at(at, waiting)
                .await
                .map_err(|_| deadline_exceeded("verdict"))??,
            None => waiting.await?,
        };
        Ok((id, verdict))
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            workers: self.worker_count,
            queue_depth: self.shared.queue.depth(),
            queue_capacity: self.shared.queue.capacity(),
            pending_results: self.shared.store.len(),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Unavailable while shutting down, otherwise whatever the checker reports
    pub async fn health_check(&self) -> HealthStatus {
        if self.is_shutting_down() {
            return HealthStatus::Unavailable {
                reason: "dispatcher is shutting down".to_string(),
            };
        }
        self.shared.checker.health_check().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Stop accepting jobs, let the workers drain the queue, then join them
    pub async fn shutdown(&self) {
        self.shared.queue.close();
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if workers.is_empty() {
            return;
        }

        info!(
            workers = workers.len(),
            queued = self.shared.queue.depth(),
            "Dispatcher draining"
        );
        for handle in workers {
            if let Err(err) = handle.await {
                warn!(error = %err, "Worker exited abnormally");
            }
        }
        self.stop_sweeper();
        info!(completed = self.shared.completed.load(Ordering::Relaxed), "Dispatcher stopped");
    }

    fn stop_sweeper(&self) {
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.abort();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Workers finish whatever is still queued and then exit on their own
        self.shared.queue.close();
        self.stop_sweeper();
    }
}

fn spawn_sweeper(store: Arc<ResultStore>, grace: Duration, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = store.sweep(grace);
            if stats.total() > 0 {
                debug!(
                    expired_verdicts = stats.expired_verdicts,
                    abandoned_waiters = stats.abandoned_waiters,
                    "Swept result store"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct InstantChecker;

    #[async_trait]
    impl Checker for InstantChecker {
        fn name(&self) -> &str {
            "instant"
        }

        async fn check(&self, job: &VerificationJob) -> VerificationVerdict {
            let mut verdict = VerificationVerdict::from_diagnostics(vec![], vec![], Duration::ZERO);
            verdict.detail = Some(job.id.to_string());
            verdict
        }
    }

    #[test]
    fn test_request_builder() {
        let request = VerificationRequest::new(" by simp", "theorem t : True :=")
            .with_checker("/usr/bin/lake")
            .with_workspace("/ws")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(request.checker_path, Some(PathBuf::from("/usr/bin/lake")));
        assert_eq!(request.workspace_path, Some(PathBuf::from("/ws")));
        assert_eq!(request.timeout, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let dispatcher = Dispatcher::start(
            DispatcherConfig::new().with_max_workers(1),
            Arc::new(InstantChecker),
        )
        .await
        .unwrap();

        for n in 1..=3 {
            let verdict = dispatcher
                .submit(VerificationRequest::new(" rfl", "example : 1 = 1 :="))
                .await
                .unwrap();
            assert_eq!(verdict.detail, Some(format!("job-{n}")));
        }
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_huge_timeout_with_bound_still_completes() {
        let dispatcher = Dispatcher::start(
            DispatcherConfig::new()
                .with_max_workers(1)
                .with_queue_wait_bound(Duration::from_secs(1)),
            Arc::new(InstantChecker),
        )
        .await
        .unwrap();

        let verdict = dispatcher
            .submit(VerificationRequest::new(" rfl", "example : 1 = 1 :=").with_timeout(Duration::MAX))
            .await
            .unwrap();
        assert!(verdict.success);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_after_shutdown() {
        let dispatcher = Dispatcher::start(
            DispatcherConfig::new().with_max_workers(2).with_queue_capacity(16),
            Arc::new(InstantChecker),
        )
        .await
        .unwrap();
        dispatcher
            .submit(VerificationRequest::new(" rfl", "example : 1 = 1 :="))
            .await
            .unwrap();
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.queue_depth, 0);
        assert_eq!(stats.queue_capacity, 16);
        assert_eq!(stats.pending_results, 0);
        assert!(dispatcher.is_shutting_down());
        assert!(!dispatcher.health_check().await.is_healthy());

        // Second shutdown is a no-op
        dispatcher.shutdown().await;
    }
}
