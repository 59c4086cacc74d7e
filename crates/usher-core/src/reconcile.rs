//! Reconciler: applies schedule intents to an external scheduler
//!
//! Intents are applied one at a time, in order. A failed intent is logged
//! and recorded; the remaining intents still run. Each call is bounded by a
//! timeout and retried under a [`RetryPolicy`] unless the scheduler reports
//! the failure as permanent.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use usher_api::ScheduleIntent;
use usher_scheduler_api::{ExternalScheduler, SchedulerError, SchedulerResult, UpsertRequest};
use usher_util::{format_duration, Clock, RetryPolicy, DEFAULT_CALL_TIMEOUT};

/// An intent that could not be applied
#[derive(Debug, Clone, PartialEq)]
pub struct IntentFailure {
    pub intent: ScheduleIntent,
    pub error: SchedulerError,
    pub attempts: u32,
}

/// What happened to a batch of intents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub applied: Vec<ScheduleIntent>,
    pub failures: Vec<IntentFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.applied.len() + self.failures.len()
    }
}

/// Applies intents against an [`ExternalScheduler`]
#[derive(Clone)]
pub struct Reconciler {
    scheduler: Arc<dyn ExternalScheduler>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    call_timeout: Duration,
    target: String,
}

impl Reconciler {
    /// Create a reconciler delivering fired triggers to `target`
    pub fn new(
        scheduler: Arc<dyn ExternalScheduler>,
        clock: Arc<dyn Clock>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            clock,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            target: target.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.scheduler.backend()
    }

    /// Apply each intent in order, never stopping early
    pub async fn apply(&self, intents: &[ScheduleIntent]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for intent in intents {
            match self.apply_with_retry(intent).await {
                Ok(attempts) => {
                    info!(
                        session_id = %intent.session_id,
                        kind = %intent.kind,
                        name = %intent.name(),
                        fire_at = ?intent.fire_at(),
                        attempts,
                        "Applied {}",
                        if intent.is_delete() { "delete" } else { "upsert" }
                    );
                    report.applied.push(intent.clone());
                }
                Err((error, attempts)) => {
                    warn!(
                        session_id = %intent.session_id,
                        kind = %intent.kind,
                        name = %intent.name(),
                        fire_at = ?intent.fire_at(),
                        attempts,
                        error = %error,
                        "Failed to apply schedule intent"
                    );
                    report.failures.push(IntentFailure {
                        intent: intent.clone(),
                        error,
                        attempts,
                    });
                }
            }
        }

        report
    }

    async fn apply_with_retry(&self, intent: &ScheduleIntent) -> Result<u32, (SchedulerError, u32)> {
        if let Some(fire_at) = intent.fire_at() {
            let now = self.clock.now();
            if fire_at < now {
                warn!(
                    session_id = %intent.session_id,
                    kind = %intent.kind,
                    fire_at = %fire_at,
                    now = %now,
                    "Fire time already passed; scheduling anyway"
                );
            }
        }

        let mut attempt = 1;
        loop {
            match self.call_once(intent).await {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_retryable() && self.retry.has_attempts_remaining(attempt) => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(
                        name = %intent.name(),
                        attempt,
                        backoff = %format_duration(delay),
                        error = %err,
                        "Scheduler call failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }

    async fn call_once(&self, intent: &ScheduleIntent) -> SchedulerResult<()> {
        let call = async {
            match UpsertRequest::from_intent(intent, &self.target) {
                Some(request) => self.scheduler.upsert(&request).await,
                None => match self.scheduler.delete(&intent.name()).await {
                    Err(SchedulerError::NotFound(_)) => Ok(()),
                    other => other,
                },
            }
        };

        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(SchedulerError::Timeout(self.call_timeout)))
    }
}
