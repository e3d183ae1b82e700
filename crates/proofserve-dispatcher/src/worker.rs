//! Worker loop
//!
//! Each worker pulls jobs until the queue is closed and drained. A job always
//! ends with exactly one published verdict, even if the checker panics.

use crate::dispatcher::Shared;
use crate::log::LogRecord;
use crate::store::Delivery;
use proofserve_checker::{Checker, FailureReason, VerificationJob, VerificationVerdict};
use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

pub(crate) async fn run(worker: usize, shared: Arc<Shared>) {
    debug!(worker, "Worker started");
    while let Some(job) = shared.queue.dequeue().await {
        debug!(
            worker,
            job_id = %job.id,
            queued_ms = job.queued_for().as_millis() as u64,
            "Job picked up"
        );
        let verdict = execute(&shared.checker, &job).await;
        finish(&shared, &job, verdict).await;
    }
    debug!(worker, "Worker stopped");
}

/// Run the checker in its own task so a panic cannot take the worker down
async fn execute(checker: &Arc<dyn Checker>, job: &VerificationJob) -> VerificationVerdict {
    let started = Instant::now();
    let checker = Arc::clone(checker);
    let task_job = job.clone();
    match tokio::spawn(async move { checker.check(&task_job).await }).await {
        Ok(verdict) => verdict,
        Err(err) => {
            let detail = join_error_detail(err);
            error!(job_id = %job.id, detail = %detail, "Checker task failed");
            VerificationVerdict::failure(FailureReason::ProcessError, detail, started.elapsed())
        }
    }
}

async fn finish(shared: &Shared, job: &VerificationJob, verdict: VerificationVerdict) {
    report(job, &verdict);

    if let Some(log) = &shared.log {
        if let Err(err) = log.append(&LogRecord::new(job, &verdict)).await {
            warn!(job_id = %job.id, path = %log.path().display(), error = %err, "Failed to append verification log");
        }
    }

    shared.queue.task_done();
    shared.completed.fetch_add(1, Ordering::Relaxed);

    match shared.store.publish(job.id, verdict) {
        Ok(Delivery::Discarded) => {
            debug!(job_id = %job.id, "Submitter gone, verdict discarded");
        }
        Ok(_) => {}
        Err(err) => error!(job_id = %job.id, error = %err, "Failed to publish verdict"),
    }
}

fn report(job: &VerificationJob, verdict: &VerificationVerdict) {
    let duration_ms = verdict.duration.as_millis() as u64;
    match verdict.failure_reason {
        Some(reason) => warn!(
            job_id = %job.id,
            reason = %reason,
            proof = %job.proof_excerpt(),
            duration_ms,
            detail = verdict.detail.as_deref().unwrap_or(""),
            "Verification failed"
        ),
        None => info!(
            job_id = %job.id,
            outcome = verdict.outcome_label(),
            sorries = verdict.sorries.len(),
            errors = verdict.errors.len(),
            duration_ms,
            "Verification finished"
        ),
    }
}

fn join_error_detail(err: JoinError) -> String {
    if err.is_cancelled() {
        return "checker task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("checker panicked: {}", panic_message(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_payload_is_reported() {
        let err = tokio::spawn(async { panic!("boom {}", 7) }).await.unwrap_err();
        assert_eq!(join_error_detail(err), "checker panicked: boom 7");

        let err = tokio::spawn(async { std::panic::panic_any(42_u32) })
            .await
            .unwrap_err();
        assert_eq!(
            join_error_detail(err),
            "checker panicked: non-string panic payload"
        );
    }

    #[tokio::test]
    async fn test_cancelled_task_is_reported() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let err = handle.await.unwrap_err();
        assert_eq!(join_error_detail(err), "checker task was cancelled");
    }
}
