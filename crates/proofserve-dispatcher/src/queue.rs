//! Bounded FIFO hand-off between submitters and the worker pool
//!
//! Any number of submitters push through cloned senders; the N workers share
//! the single receiver behind a fair async mutex, so jobs leave in the order
//! they arrived. `depth` counts jobs accepted but not yet `task_done`, which
//! includes jobs a worker is currently running.

use crate::config::QueuePolicy;
use crate::error::DispatchError;
use proofserve_checker::VerificationJob;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

pub struct TaskQueue {
    sender: Mutex<Option<mpsc::Sender<VerificationJob>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<VerificationJob>>,
    policy: QueuePolicy,
    capacity: usize,
    depth: AtomicUsize,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` waiting jobs (minimum 1)
    pub fn new(capacity: usize, policy: QueuePolicy) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            policy,
            capacity,
            depth: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Jobs accepted and not yet marked done
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Push a job, applying the configured backpressure policy
    ///
    /// Cancel safe: dropping the future while it waits for capacity leaves
    /// the job unqueued and the depth unchanged.
    pub async fn enqueue(&self, job: VerificationJob) -> Result<(), DispatchError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DispatchError::ShuttingDown)?;

        let permit = match self.policy {
            QueuePolicy::Reject => sender.try_reserve().map_err(|e| match e {
                TrySendError::Full(()) => DispatchError::QueueFull {
                    capacity: self.capacity,
                },
                TrySendError::Closed(()) => DispatchError::ShuttingDown,
            })?,
            QueuePolicy::Wait => sender
                .reserve()
                .await
                .map_err(|_| DispatchError::ShuttingDown)?,
        };

        // Count before the send so a fast worker's task_done can never underflow
        self.depth.fetch_add(1, Ordering::AcqRel);
        let id = job.id;
        permit.send(job);
        debug!(job_id = %id, depth = self.depth(), "Job enqueued");
        Ok(())
    }

    /// Wait for the next job; `None` once the queue is closed and drained
    pub async fn dequeue(&self) -> Option<VerificationJob> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Mark a dequeued job as fully processed
    pub fn task_done(&self) {
        self.release();
    }

    /// Stop accepting jobs; queued jobs are still handed out
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            debug!(depth = self.depth(), "Task queue closed");
        }
    }

    fn release(&self) {
        // Saturating so a stray task_done cannot wrap the counter
        let _ = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofserve_checker::JobId;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(n: u64) -> VerificationJob {
        VerificationJob::new(JobId(n), " by simp", "theorem t : True :=", "lake", ".", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(8, QueuePolicy::Reject);
        for n in 1..=5 {
            queue.enqueue(job(n)).await.unwrap();
        }
        for n in 1..=5 {
            assert_eq!(queue.dequeue().await.unwrap().id, JobId(n));
        }
    }

    #[tokio::test]
    async fn test_reject_when_full() {
        let queue = TaskQueue::new(2, QueuePolicy::Reject);
        queue.enqueue(job(1)).await.unwrap();
        queue.enqueue(job(2)).await.unwrap();

        let err = queue.enqueue(job(3)).await.unwrap_err();
        assert!(matches!(err, DispatchError::QueueFull { capacity: 2 }));
        assert_eq!(err.kind(), "queue_full");
        // The rejected job is not counted
        assert_eq!(queue.depth(), 2);
    }

    #[tokio::test]
    async fn test_wait_policy_blocks_until_capacity() {
        let queue = Arc::new(TaskQueue::new(1, QueuePolicy::Wait));
        queue.enqueue(job(1)).await.unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(job(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pusher.is_finished(), "second enqueue should wait for space");

        assert_eq!(queue.dequeue().await.unwrap().id, JobId(1));
        pusher.await.unwrap().unwrap();
        assert_eq!(queue.dequeue().await.unwrap().id, JobId(2));
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_queue_untouched() {
        let queue = TaskQueue::new(1, QueuePolicy::Wait);
        queue.enqueue(job(1)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), queue.enqueue(job(2))).await;
        assert!(blocked.is_err(), "enqueue should still be waiting for space");
        assert_eq!(queue.depth(), 1);

        assert_eq!(queue.dequeue().await.unwrap().id, JobId(1));
        queue.task_done();
        queue.close();
        assert!(queue.dequeue().await.is_none(), "cancelled job must not be queued");
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_depth_tracks_task_done() {
        let queue = TaskQueue::new(4, QueuePolicy::Reject);
        queue.enqueue(job(1)).await.unwrap();
        queue.enqueue(job(2)).await.unwrap();
        assert_eq!(queue.depth(), 2);

        let _ = queue.dequeue().await.unwrap();
        // Still in flight until the worker reports back
        assert_eq!(queue.depth(), 2);
        queue.task_done();
        assert_eq!(queue.depth(), 1);

        queue.task_done();
        queue.task_done();
        assert_eq!(queue.depth(), 0, "depth saturates at zero");
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = TaskQueue::new(4, QueuePolicy::Reject);
        queue.enqueue(job(1)).await.unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(
            queue.enqueue(job(2)).await,
            Err(DispatchError::ShuttingDown)
        ));
        assert_eq!(queue.dequeue().await.unwrap().id, JobId(1));
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consumers_see_each_job_once() {
        let queue = Arc::new(TaskQueue::new(64, QueuePolicy::Reject));
        for n in 0..50 {
            queue.enqueue(job(n)).await.unwrap();
        }
        queue.close();

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = queue.dequeue().await {
                    seen.push(job.id.0);
                    queue.task_done();
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
        assert_eq!(queue.depth(), 0);
    }
}
