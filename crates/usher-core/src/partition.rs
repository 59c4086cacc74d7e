//! Partitioned intake
//!
//! Fans changes out to a fixed set of workers keyed by session id. Every
//! change for one session lands on the same worker and is handled in
//! submission order; different sessions proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::AddAssign;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use usher_api::SessionChange;
use usher_util::SessionId;

use crate::{DispatchOutcome, Dispatcher};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Intake worker {0} is no longer running")]
    WorkerClosed(usize),
}

/// Counters accumulated by intake workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub changes: u64,
    pub skipped: u64,
    pub intents_applied: u64,
    pub intents_failed: u64,
}

impl IntakeStats {
    fn record(&mut self, outcome: &DispatchOutcome) {
        self.changes += 1;
        if outcome.skipped.is_some() {
            self.skipped += 1;
        }
        self.intents_applied += outcome.report.applied.len() as u64;
        self.intents_failed += outcome.report.failures.len() as u64;
    }
}

impl AddAssign for IntakeStats {
    fn add_assign(&mut self, other: Self) {
        self.changes += other.changes;
        self.skipped += other.skipped;
        self.intents_applied += other.intents_applied;
        self.intents_failed += other.intents_failed;
    }
}

/// Single-writer-per-session dispatcher over a pool of tokio tasks
pub struct PartitionedDispatcher {
    senders: Vec<mpsc::Sender<SessionChange>>,
    workers: Vec<JoinHandle<IntakeStats>>,
}

impl PartitionedDispatcher {
    /// Spawn `workers` tasks, each with a queue of `queue_depth` changes.
    /// Both are clamped to at least 1.
    pub fn new(dispatcher: Dispatcher, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let queue_depth = queue_depth.max(1);

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = mpsc::channel(queue_depth);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(index, dispatcher.clone(), rx)));
        }

        info!(workers, queue_depth, "Partitioned intake started");

        Self {
            senders,
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Worker index for a session. Stable for the life of the process.
    pub fn partition_for(&self, session_id: &SessionId) -> usize {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue a change on its session's worker, waiting for capacity
    pub async fn submit(&self, change: SessionChange) -> Result<(), IntakeError> {
        // Changes with no identifiable session still need a home; they are
        // skipped by derivation anyway.
        let index = change
            .session_id()
            .map(|id| self.partition_for(id))
            .unwrap_or(0);

        self.senders[index]
            .send(change)
            .await
            .map_err(|_| IntakeError::WorkerClosed(index))
    }

    /// Stop accepting changes and wait for every queued change to finish
    pub async fn shutdown(self) -> IntakeStats {
        drop(self.senders);

        let mut total = IntakeStats::default();
        for (index, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => total += stats,
                Err(e) => error!(worker = index, error = %e, "Intake worker failed"),
            }
        }

        info!(
            changes = total.changes,
            skipped = total.skipped,
            applied = total.intents_applied,
            failed = total.intents_failed,
            "Partitioned intake drained"
        );
        total
    }
}

async fn run_worker(
    index: usize,
    dispatcher: Dispatcher,
    mut rx: mpsc::Receiver<SessionChange>,
) -> IntakeStats {
    let mut stats = IntakeStats::default();

    while let Some(change) = rx.recv().await {
        let outcome = dispatcher.handle(&change).await;
        stats.record(&outcome);
    }

    debug!(worker = index, changes = stats.changes, "Intake worker finished");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use usher_api::Session;
    use usher_scheduler_api::{MockScheduler, SchedulerCall};
    use usher_util::FixedClock;

    use crate::{DerivationOptions, Reconciler};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap()
    }

    fn dispatcher(scheduler: Arc<MockScheduler>) -> Dispatcher {
        Dispatcher::new(
            Reconciler::new(scheduler, Arc::new(FixedClock::new(base())), "t"),
            DerivationOptions::default(),
        )
    }

    fn with_end(id: &str, hours: i64) -> Session {
        Session::new(id).with_end_time(base() + Duration::hours(hours))
    }

    #[tokio::test]
    async fn same_key_changes_apply_in_order() {
        let scheduler = Arc::new(MockScheduler::new());
        scheduler.set_delay(Some(StdDuration::from_millis(2)));
        let intake = PartitionedDispatcher::new(dispatcher(scheduler.clone()), 4, 2);

        for id in ["a", "b", "c"] {
            intake
                .submit(SessionChange::create(with_end(id, 1), base()))
                .await
                .unwrap();
        }
        for hours in 2..8 {
            for id in ["a", "b", "c"] {
                let change =
                    SessionChange::update(with_end(id, hours - 1), with_end(id, hours), base());
                intake.submit(change).await.unwrap();
            }
        }

        let stats = intake.shutdown().await;
        assert_eq!(stats.changes, 21);
        assert_eq!(stats.intents_applied, 21);
        assert_eq!(stats.intents_failed, 0);

        for id in ["a", "b", "c"] {
            let name = format!("closed-{id}");
            let trigger = scheduler.get(&name).unwrap();
            assert_eq!(trigger.fire_at, base() + Duration::hours(7));

            // Every call for this key was made in submission order
            let fire_times: Vec<_> = scheduler
                .calls()
                .into_iter()
                .filter(|c| c.name() == name)
                .map(|c| match c {
                    SchedulerCall::Upsert { fire_at, .. } => fire_at,
                    SchedulerCall::Delete { .. } => panic!("unexpected delete"),
                })
                .collect();
            let expected: Vec<_> = (1..8).map(|h| base() + Duration::hours(h)).collect();
            assert_eq!(fire_times, expected);
        }
    }

    #[tokio::test]
    async fn out_of_order_updates_leave_last_processed_values() {
        let scheduler = Arc::new(MockScheduler::new());
        let intake = PartitionedDispatcher::new(dispatcher(scheduler.clone()), 2, 8);

        // Commit order would be 1 -> 2 -> 3; the stream delivers 2 -> 3 before 1 -> 2.
        intake
            .submit(SessionChange::update(with_end("s", 2), with_end("s", 3), base()))
            .await
            .unwrap();
        intake
            .submit(SessionChange::update(with_end("s", 1), with_end("s", 2), base()))
            .await
            .unwrap();

        let stats = intake.shutdown().await;
        assert_eq!(stats.changes, 2);

        // Degraded but not crashing: the stale value wins
        let trigger = scheduler.get("closed-s").unwrap();
        assert_eq!(trigger.fire_at, base() + Duration::hours(2));
    }

    #[tokio::test]
    async fn partitioning_is_stable() {
        let scheduler = Arc::new(MockScheduler::new());
        let intake = PartitionedDispatcher::new(dispatcher(scheduler), 0, 0);
        assert_eq!(intake.worker_count(), 1);

        let id = SessionId::new("same");
        assert_eq!(intake.partition_for(&id), intake.partition_for(&id));
        intake.shutdown().await;
    }
}
