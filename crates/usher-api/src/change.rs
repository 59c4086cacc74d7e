//! Normalized change records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use usher_util::SessionId;

use crate::Session;

/// Row-level operation carried by a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Single-letter code used by CDC envelopes
    pub fn code(&self) -> char {
        match self {
            Operation::Create => 'c',
            Operation::Update => 'u',
            Operation::Delete => 'd',
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A normalized before/after pair for one session
///
/// `Create` carries only `after`, `Delete` only `before`, and `Update` both.
/// An update missing either side is degenerate; consumers treat it as a
/// no-op rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionChange {
    pub before: Option<Session>,
    pub after: Option<Session>,
    pub operation: Operation,
    pub commit_time: DateTime<Utc>,
}

impl SessionChange {
    pub fn create(after: Session, commit_time: DateTime<Utc>) -> Self {
        Self {
            before: None,
            after: Some(after),
            operation: Operation::Create,
            commit_time,
        }
    }

    pub fn update(before: Session, after: Session, commit_time: DateTime<Utc>) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
            operation: Operation::Update,
            commit_time,
        }
    }

    pub fn delete(before: Session, commit_time: DateTime<Utc>) -> Self {
        Self {
            before: Some(before),
            after: None,
            operation: Operation::Delete,
            commit_time,
        }
    }

    /// Id of the session this change concerns, preferring the after image
    pub fn session_id(&self) -> Option<&SessionId> {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|s| &s.id)
    }

    /// True for an update that is missing its before or after image
    pub fn is_degenerate(&self) -> bool {
        self.operation == Operation::Update && (self.before.is_none() || self.after.is_none())
    }
}
