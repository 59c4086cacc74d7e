//! Session snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use usher_util::{EventId, SessionId};

/// Session status. An open enumeration: unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    #[default]
    Pending,
    OnSale,
    Cancelled,
    Other(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::OnSale => "ON_SALE",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Other(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionStatus::Cancelled)
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => SessionStatus::Pending,
            "ON_SALE" => SessionStatus::OnSale,
            "CANCELLED" | "CANCELED" => SessionStatus::Cancelled,
            _ => SessionStatus::Other(s),
        }
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session kind (opaque to reconciliation, carried for completeness)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionKind {
    #[default]
    Physical,
    Online,
    Other(String),
}

impl SessionKind {
    pub fn as_str(&self) -> &str {
        match self {
            SessionKind::Physical => "PHYSICAL",
            SessionKind::Online => "ONLINE",
            SessionKind::Other(s) => s,
        }
    }
}

impl From<String> for SessionKind {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PHYSICAL" => SessionKind::Physical,
            "ONLINE" => SessionKind::Online,
            _ => SessionKind::Other(s),
        }
    }
}

impl From<SessionKind> for String {
    fn from(kind: SessionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A snapshot of one session row
///
/// Timing fields are `None` when unset (zero or absent in the source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub event_id: EventId,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub sales_start_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Free-form venue payload, never interpreted here
    pub venue: Option<serde_json::Value>,
    pub kind: SessionKind,
}

impl Session {
    /// A pending session with no timing fields set
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            event_id: EventId::default(),
            start_time: None,
            end_time: None,
            sales_start_time: None,
            status: SessionStatus::Pending,
            venue: None,
            kind: SessionKind::Physical,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    pub fn with_end_time(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self
    }

    pub fn with_sales_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.sales_start_time = Some(at);
        self
    }

    pub fn with_status(mut self, status: impl Into<SessionStatus>) -> Self {
        self.status = status.into();
        self
    }
}
