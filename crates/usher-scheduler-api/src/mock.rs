//! Mock scheduler for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use usher_api::ScheduleName;

use crate::{
    ExternalScheduler, MemoryScheduler, SchedulerError, SchedulerResult, StoredTrigger,
    UpsertRequest,
};

/// One call observed by the mock, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Upsert { name: String, fire_at: DateTime<Utc> },
    Delete { name: String },
}

impl SchedulerCall {
    pub fn name(&self) -> &str {
        match self {
            SchedulerCall::Upsert { name, .. } | SchedulerCall::Delete { name } => name,
        }
    }
}

/// [`MemoryScheduler`] plus a call log and failure injection, for tests
///
/// Failures can be injected globally, per schedule name, or for the next N
/// calls. A configurable delay simulates a slow backend.
#[derive(Debug, Default)]
pub struct MockScheduler {
    store: MemoryScheduler,
    calls: Mutex<Vec<SchedulerCall>>,
    fail_all: Mutex<Option<SchedulerError>>,
    fail_names: Mutex<HashMap<String, SchedulerError>>,
    fail_next: Mutex<Vec<SchedulerError>>,
    delay: Mutex<Option<Duration>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `error` until cleared
    pub fn fail_all(&self, error: Option<SchedulerError>) {
        *self.fail_all.lock().unwrap() = error;
    }

    /// Make every call against `name` fail with `error`
    pub fn fail_name(&self, name: impl Into<String>, error: SchedulerError) {
        self.fail_names.lock().unwrap().insert(name.into(), error);
    }

    /// Fail the next `count` calls with `error`, then behave normally
    pub fn fail_next(&self, count: usize, error: SchedulerError) {
        let mut queue = self.fail_next.lock().unwrap();
        queue.extend(std::iter::repeat_n(error, count));
    }

    /// Sleep this long inside every call
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Snapshot of all stored triggers, ordered by name
    pub fn triggers(&self) -> Vec<StoredTrigger> {
        self.store.triggers()
    }

    pub fn get(&self, name: &str) -> Option<StoredTrigger> {
        self.store.get(name)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Every call observed so far, including failed ones
    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Seed a trigger without recording a call
    pub fn insert(&self, trigger: StoredTrigger) {
        self.store.insert(trigger);
    }

    async fn before_call(&self, call: SchedulerCall) -> SchedulerResult<()> {
        let name = call.name().to_string();
        self.calls.lock().unwrap().push(call);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.fail_all.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(err) = self.fail_names.lock().unwrap().get(&name) {
            return Err(err.clone());
        }
        let mut queue = self.fail_next.lock().unwrap();
        if !queue.is_empty() {
            return Err(queue.remove(0));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalScheduler for MockScheduler {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn upsert(&self, request: &UpsertRequest) -> SchedulerResult<()> {
        self.before_call(SchedulerCall::Upsert {
            name: request.name.to_string(),
            fire_at: request.fire_at,
        })
        .await?;
        self.store.upsert(request).await
    }

    async fn delete(&self, name: &ScheduleName) -> SchedulerResult<()> {
        self.before_call(SchedulerCall::Delete {
            name: name.to_string(),
        })
        .await?;
        self.store.delete(name).await
    }
}
