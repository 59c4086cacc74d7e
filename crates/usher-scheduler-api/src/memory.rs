//! In-process scheduler backend
//!
//! Holds the latest trigger per schedule name and nothing else. Nothing is
//! persisted, so every schedule is lost when the process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use usher_api::ScheduleName;

use crate::{ExternalScheduler, SchedulerResult, TriggerPayload, UpsertRequest};

/// A trigger as held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTrigger {
    pub name: String,
    pub fire_at: DateTime<Utc>,
    pub target: String,
    pub action_label: String,
    pub description: String,
    pub payload: TriggerPayload,
}

impl StoredTrigger {
    pub fn from_request(request: &UpsertRequest) -> Self {
        Self {
            name: request.name.to_string(),
            fire_at: request.fire_at,
            target: request.target.clone(),
            action_label: request.action_label.clone(),
            description: request.description.clone(),
            payload: request.payload.clone(),
        }
    }
}

/// Name-keyed trigger table; memory use is bounded by the number of live schedules
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    triggers: Mutex<BTreeMap<String, StoredTrigger>>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored triggers, ordered by name
    pub fn triggers(&self) -> Vec<StoredTrigger> {
        self.triggers.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<StoredTrigger> {
        self.triggers.lock().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace by name
    pub fn insert(&self, trigger: StoredTrigger) {
        self.triggers
            .lock()
            .unwrap()
            .insert(trigger.name.clone(), trigger);
    }

    /// Returns whether a trigger was removed
    pub fn remove(&self, name: &str) -> bool {
        self.triggers.lock().unwrap().remove(name).is_some()
    }
}

#[async_trait]
impl ExternalScheduler for MemoryScheduler {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, request: &UpsertRequest) -> SchedulerResult<()> {
        self.insert(StoredTrigger::from_request(request));
        Ok(())
    }

    async fn delete(&self, name: &ScheduleName) -> SchedulerResult<()> {
        // Missing names are not an error
        self.remove(&name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use usher_api::{ScheduleIntent, ScheduleKind, Session};

    fn request(kind: ScheduleKind, session_id: &str, hour: u32) -> UpsertRequest {
        let at = Utc.with_ymd_and_hms(2025, 9, 1, hour, 0, 0).unwrap();
        let intent = ScheduleIntent::upsert(kind, &Session::new(session_id), at);
        UpsertRequest::from_intent(&intent, "queue://test").unwrap()
    }

    #[tokio::test]
    async fn holds_only_live_triggers() {
        let scheduler = MemoryScheduler::new();
        let name = ScheduleName::new(ScheduleKind::Closed, "s1".into());

        for hour in 0..20 {
            scheduler
                .upsert(&request(ScheduleKind::Closed, "s1", hour))
                .await
                .unwrap();
            scheduler.delete(&name).await.unwrap();
        }
        assert!(scheduler.is_empty());

        scheduler
            .upsert(&request(ScheduleKind::Closed, "s1", 21))
            .await
            .unwrap();
        scheduler
            .upsert(&request(ScheduleKind::OnSale, "s1", 8))
            .await
            .unwrap();

        assert_eq!(scheduler.len(), 2);
        assert_eq!(
            scheduler.get("closed-s1").unwrap().fire_at,
            Utc.with_ymd_and_hms(2025, 9, 1, 21, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let scheduler = MemoryScheduler::new();
        let name = ScheduleName::new(ScheduleKind::OnSale, "nope".into());
        scheduler.delete(&name).await.unwrap();
        assert!(!scheduler.remove("on-sale-nope"));
    }
}
