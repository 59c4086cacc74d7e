//! Schedule derivation
//!
//! Pure mapping from one [`SessionChange`] to the schedule operations that
//! bring the external scheduler in line with it. No I/O, never panics.
//!
//! Rules:
//! - Create: one upsert per kind whose driving timestamp is set.
//! - Update into `CANCELLED`: delete ON_SALE, CLOSED, SESSION_REMINDER and
//!   nothing else, regardless of simultaneous timing changes.
//! - Update between two cancelled states: nothing.
//! - Any other update: one intent per changed timing field. A field that
//!   became unset deletes its schedule.
//! - Delete: delete ON_SALE, CLOSED, SESSION_REMINDER.
//!
//! SALE_REMINDER is only re-derived on update when
//! [`DerivationOptions::rederive_sale_reminder`] is set. It is never part of
//! the cancellation or delete sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use usher_api::{Operation, ScheduleIntent, ScheduleKind, Session, SessionChange};
use usher_util::SessionId;

/// Schedules removed when a session is cancelled or deleted
pub const TEARDOWN_KINDS: [ScheduleKind; 3] = [
    ScheduleKind::OnSale,
    ScheduleKind::Closed,
    ScheduleKind::SessionReminder,
];

/// Knobs for derivation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationOptions {
    /// Re-derive SALE_REMINDER whenever `sales_start_time` changes on update
    pub rederive_sale_reminder: bool,
}

/// Why a change produced no intents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Update missing its before or after image
    DegenerateUpdate { session_id: Option<SessionId> },
    /// Create without an after image, or delete without a before image
    MissingImage {
        operation: Operation,
        session_id: Option<SessionId>,
    },
    /// Both sides of an update are already cancelled
    AlreadyCancelled(SessionId),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DegenerateUpdate { .. } => f.write_str("degenerate update"),
            SkipReason::MissingImage { operation, .. } => {
                write!(f, "{} without its row image", operation)
            }
            SkipReason::AlreadyCancelled(_) => f.write_str("already cancelled"),
        }
    }
}

/// Result of deriving one change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Derivation {
    /// Intents in stable kind order: ON_SALE, CLOSED, SESSION_REMINDER, SALE_REMINDER
    pub intents: Vec<ScheduleIntent>,
    pub skipped: Option<SkipReason>,
}

impl Derivation {
    fn intents(intents: Vec<ScheduleIntent>) -> Self {
        Self {
            intents,
            skipped: None,
        }
    }

    fn skip(reason: SkipReason) -> Self {
        Self {
            intents: Vec::new(),
            skipped: Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Derive the schedule intents for one change
pub fn derive(change: &SessionChange, options: &DerivationOptions) -> Derivation {
    match change.operation {
        Operation::Create => match &change.after {
            Some(after) => Derivation::intents(derive_create(after)),
            None => Derivation::skip(SkipReason::MissingImage {
                operation: change.operation,
                session_id: change.session_id().cloned(),
            }),
        },
        Operation::Delete => match &change.before {
            Some(before) => Derivation::intents(teardown(before)),
            None => Derivation::skip(SkipReason::MissingImage {
                operation: change.operation,
                session_id: change.session_id().cloned(),
            }),
        },
        Operation::Update => match (&change.before, &change.after) {
            (Some(before), Some(after)) => derive_update(before, after, options),
            _ => Derivation::skip(SkipReason::DegenerateUpdate {
                session_id: change.session_id().cloned(),
            }),
        },
    }
}

fn derive_create(after: &Session) -> Vec<ScheduleIntent> {
    ScheduleKind::ALL
        .iter()
        .filter_map(|&kind| {
            kind.fire_time(after)
                .map(|at| ScheduleIntent::upsert(kind, after, at))
        })
        .collect()
}

fn teardown(session: &Session) -> Vec<ScheduleIntent> {
    TEARDOWN_KINDS
        .iter()
        .map(|&kind| ScheduleIntent::delete(kind, session))
        .collect()
}

fn derive_update(before: &Session, after: &Session, options: &DerivationOptions) -> Derivation {
    match (before.status.is_cancelled(), after.status.is_cancelled()) {
        (false, true) => return Derivation::intents(teardown(after)),
        (true, true) => return Derivation::skip(SkipReason::AlreadyCancelled(after.id.clone())),
        _ => {}
    }

    let sales_changed = before.sales_start_time != after.sales_start_time;

    let changed = [
        (ScheduleKind::OnSale, sales_changed),
        (ScheduleKind::Closed, before.end_time != after.end_time),
        (
            ScheduleKind::SessionReminder,
            before.start_time != after.start_time,
        ),
        (
            ScheduleKind::SaleReminder,
            sales_changed && options.rederive_sale_reminder,
        ),
    ];

    let intents = changed
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(kind, _)| match kind.fire_time(after) {
            Some(at) => ScheduleIntent::upsert(kind, after, at),
            None => ScheduleIntent::delete(kind, after),
        })
        .collect();

    Derivation::intents(intents)
}
