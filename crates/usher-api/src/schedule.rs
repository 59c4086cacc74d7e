//! Schedule kinds, names, and intents

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use usher_util::{EventId, SessionId};

use crate::Session;

/// How long before `start_time` the session reminder fires
pub fn session_reminder_lead() -> Duration {
    Duration::days(1)
}

/// How long before `sales_start_time` the sale reminder fires
pub fn sale_reminder_lead() -> Duration {
    Duration::minutes(30)
}

/// The closed set of schedules maintained per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleKind {
    OnSale,
    Closed,
    SessionReminder,
    SaleReminder,
}

impl ScheduleKind {
    pub const ALL: [ScheduleKind; 4] = [
        ScheduleKind::OnSale,
        ScheduleKind::Closed,
        ScheduleKind::SessionReminder,
        ScheduleKind::SaleReminder,
    ];

    /// Name prefix; the schedule name is this prefix followed by the session id
    pub fn prefix(&self) -> &'static str {
        match self {
            ScheduleKind::OnSale => "on-sale-",
            ScheduleKind::Closed => "closed-",
            ScheduleKind::SessionReminder => "session-reminder-",
            ScheduleKind::SaleReminder => "sale-reminder-",
        }
    }

    /// Label delivered downstream when the schedule fires
    pub fn action_label(&self) -> &'static str {
        match self {
            ScheduleKind::OnSale => "ON_SALE",
            ScheduleKind::Closed => "CLOSED",
            ScheduleKind::SessionReminder => "SESSION_REMINDER",
            ScheduleKind::SaleReminder => "SALE_REMINDER",
        }
    }

    /// Fire time for this kind, or `None` when the driving field is unset
    pub fn fire_time(&self, session: &Session) -> Option<DateTime<Utc>> {
        match self {
            ScheduleKind::OnSale => session.sales_start_time,
            ScheduleKind::Closed => session.end_time,
            ScheduleKind::SessionReminder => session
                .start_time
                .and_then(|t| t.checked_sub_signed(session_reminder_lead())),
            ScheduleKind::SaleReminder => session
                .sales_start_time
                .and_then(|t| t.checked_sub_signed(sale_reminder_lead())),
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_label())
    }
}

/// Deterministic external identity of one schedule: `prefix ++ session_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleName {
    prefix: &'static str,
    session_id: SessionId,
}

impl ScheduleName {
    pub fn new(kind: ScheduleKind, session_id: SessionId) -> Self {
        Self {
            prefix: kind.prefix(),
            session_id,
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl fmt::Display for ScheduleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.session_id)
    }
}

/// What to do with one schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScheduleAction {
    Upsert { fire_at: DateTime<Utc> },
    Delete,
}

/// A schedule that should now exist at a given time, or should now be gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleIntent {
    pub kind: ScheduleKind,
    pub session_id: SessionId,
    pub event_id: EventId,
    pub action: ScheduleAction,
    pub label: String,
}

impl ScheduleIntent {
    pub fn upsert(kind: ScheduleKind, session: &Session, fire_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            session_id: session.id.clone(),
            event_id: session.event_id.clone(),
            action: ScheduleAction::Upsert { fire_at },
            label: kind.action_label().to_string(),
        }
    }

    pub fn delete(kind: ScheduleKind, session: &Session) -> Self {
        Self {
            kind,
            session_id: session.id.clone(),
            event_id: session.event_id.clone(),
            action: ScheduleAction::Delete,
            label: kind.action_label().to_string(),
        }
    }

    pub fn name(&self) -> ScheduleName {
        ScheduleName::new(self.kind, self.session_id.clone())
    }

    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self.action {
            ScheduleAction::Upsert { fire_at } => Some(fire_at),
            ScheduleAction::Delete => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.action, ScheduleAction::Delete)
    }
}

impl fmt::Display for ScheduleIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            ScheduleAction::Upsert { fire_at } => {
                write!(f, "upsert {} @ {}", self.name(), fire_at.to_rfc3339())
            }
            ScheduleAction::Delete => write!(f, "delete {}", self.name()),
        }
    }
}
