//! External scheduler traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use usher_api::{ScheduleIntent, ScheduleName};
use usher_util::SessionId;

/// Errors from external scheduler operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Scheduler unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::NotFound(_)
            | SchedulerError::Rejected { .. }
            | SchedulerError::InvalidRequest(_) => false,
            SchedulerError::Unavailable { .. }
            | SchedulerError::Transport(_)
            | SchedulerError::Timeout(_)
            | SchedulerError::Internal(_) => true,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Message a fired trigger delivers to its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub session_id: SessionId,
    pub action_label: String,
}

/// Create-or-replace request for one named trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    pub name: ScheduleName,
    pub fire_at: DateTime<Utc>,
    /// Opaque downstream destination (queue URL, ARN, ...)
    pub target: String,
    pub action_label: String,
    pub description: String,
    pub payload: TriggerPayload,
}

impl UpsertRequest {
    /// Build the request for an upsert intent. Returns `None` for deletes.
    pub fn from_intent(intent: &ScheduleIntent, target: &str) -> Option<Self> {
        let fire_at = intent.fire_at()?;

        let description = if intent.event_id.is_empty() {
            format!("{} for session {}", intent.label, intent.session_id)
        } else {
            format!(
                "{} for session {} of event {}",
                intent.label, intent.session_id, intent.event_id
            )
        };

        Some(Self {
            name: intent.name(),
            fire_at,
            target: target.to_string(),
            action_label: intent.label.clone(),
            description,
            payload: TriggerPayload {
                session_id: intent.session_id.clone(),
                action_label: intent.label.clone(),
            },
        })
    }
}

/// External scheduler capability
///
/// Both operations must be idempotent: upserting an existing name replaces
/// it, and deleting a name that does not exist succeeds.
#[async_trait]
pub trait ExternalScheduler: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Create or replace the trigger named `request.name`
    async fn upsert(&self, request: &UpsertRequest) -> SchedulerResult<()>;

    /// Delete the trigger with the given name
    async fn delete(&self, name: &ScheduleName) -> SchedulerResult<()>;
}
