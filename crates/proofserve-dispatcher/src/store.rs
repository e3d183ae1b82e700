//! Result store bridging the worker pool and waiting submitters
//!
//! Each job id maps to one slot. A slot is either a published verdict waiting
//! to be collected, or a parked waiter (a `oneshot` sender) waiting for the
//! verdict. Both operations run under the `DashMap` entry lock for that id, so
//! a publish and a take for the same id are linearizable while distinct ids
//! land on independent entries.
//!
//! Disposal of uncollected state is twofold:
//! - lazy: publishing to a waiter that went away drops the verdict immediately
//! - sweep: [`ResultStore::sweep`] removes verdicts older than a grace period
//!   and waiters whose receiving side was dropped

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use proofserve_checker::{JobId, VerificationVerdict};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// Result store invariant violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A verdict for this id is already waiting to be collected
    #[error("verdict for {0} was already published")]
    AlreadyPublished(JobId),

    /// Another live waiter is already registered for this id
    #[error("{0} already has a waiter")]
    AlreadyAwaited(JobId),

    /// The slot was removed before its verdict arrived
    #[error("waiter for {0} was abandoned")]
    Abandoned(JobId),
}

/// What happened to a published verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed directly to a parked waiter
    Delivered,
    /// Stored until someone takes it
    Stored,
    /// The waiter had gone away; the verdict was dropped
    Discarded,
}

/// Counts removed by one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired_verdicts: usize,
    pub abandoned_waiters: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.expired_verdicts + self.abandoned_waiters
    }
}

enum Slot {
    Ready {
        verdict: VerificationVerdict,
        published_at: Instant,
    },
    Waiting {
        tx: oneshot::Sender<VerificationVerdict>,
    },
}

#[derive(Default)]
pub struct ResultStore {
    slots: DashMap<JobId, Slot>,
    discarded: AtomicU64,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the verdict for `id`, waking its waiter if one is parked
    pub fn publish(&self, id: JobId, verdict: VerificationVerdict) -> Result<Delivery, StoreError> {
        match self.slots.entry(id) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Ready {
                    verdict,
                    published_at: Instant::now(),
                });
                Ok(Delivery::Stored)
            }
            Entry::Occupied(occupied) => {
                if matches!(occupied.get(), Slot::Ready { .. }) {
                    return Err(StoreError::AlreadyPublished(id));
                }
                match occupied.remove() {
                    Slot::Waiting { tx } => match tx.send(verdict) {
                        Ok(()) => Ok(Delivery::Delivered),
                        Err(_) => {
                            self.discarded.fetch_add(1, Ordering::Relaxed);
                            Ok(Delivery::Discarded)
                        }
                    },
                    Slot::Ready { .. } => Err(StoreError::AlreadyPublished(id)),
                }
            }
        }
    }

    /// Wait until the verdict for `id` is published, then remove and return it.
    ///
    /// Dropping the returned future leaves an abandoned waiter behind; the
    /// next publish or sweep for that id cleans it up.
    pub async fn await_and_take(&self, id: JobId) -> Result<VerificationVerdict, StoreError> {
        let rx = match self.slots.entry(id) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                Slot::Ready { .. } => {
                    if let Slot::Ready { verdict, .. } = occupied.remove() {
                        return Ok(verdict);
                    }
                    return Err(StoreError::AlreadyAwaited(id));
                }
                Slot::Waiting { tx } if !tx.is_closed() => {
                    return Err(StoreError::AlreadyAwaited(id));
                }
                Slot::Waiting { .. } => {
                    // Previous waiter is gone; take its place
                    let (tx, rx) = oneshot::channel();
                    occupied.insert(Slot::Waiting { tx });
                    rx
                }
            },
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(Slot::Waiting { tx });
                rx
            }
        };

        rx.await.map_err(|_| StoreError::Abandoned(id))
    }

    /// Drop verdicts older than `grace` and waiters nobody listens to any more
    pub fn sweep(&self, grace: Duration) -> SweepStats {
        let mut stats = SweepStats::default();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready { published_at, .. } => {
                let keep = published_at.elapsed() < grace;
                if !keep {
                    stats.expired_verdicts += 1;
                }
                keep
            }
            Slot::Waiting { tx } => {
                let keep = !tx.is_closed();
                if !keep {
                    stats.abandoned_waiters += 1;
                }
                keep
            }
        });
        self.discarded
            .fetch_add(stats.expired_verdicts as u64, Ordering::Relaxed);
        stats
    }

    /// Whether any slot (verdict or waiter) exists for `id`
    pub fn contains(&self, id: JobId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of slots, verdicts and waiters together
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Verdicts dropped because nobody collected them
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}
