//! Single-change dispatch: derive, then reconcile

use tracing::{debug, info, warn};
use usher_api::SessionChange;
use usher_util::{ChangeId, SessionId};

use crate::{derive, DerivationOptions, ReconcileReport, Reconciler, SkipReason};

/// What happened to one dispatched change
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Correlation id assigned at dispatch, for logs
    pub change_id: ChangeId,
    pub session_id: Option<SessionId>,
    pub derived: usize,
    pub skipped: Option<SkipReason>,
    pub report: ReconcileReport,
}

impl DispatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.report.is_clean()
    }
}

/// Routes one change through derivation and reconciliation
///
/// Does not reorder or buffer; callers own ordering.
#[derive(Clone)]
pub struct Dispatcher {
    reconciler: Reconciler,
    options: DerivationOptions,
}

impl Dispatcher {
    pub fn new(reconciler: Reconciler, options: DerivationOptions) -> Self {
        Self {
            reconciler,
            options,
        }
    }

    pub fn options(&self) -> &DerivationOptions {
        &self.options
    }

    pub async fn handle(&self, change: &SessionChange) -> DispatchOutcome {
        let change_id = ChangeId::new();
        let session_id = change.session_id().cloned();
        let derivation = derive(change, &self.options);

        if let Some(reason) = &derivation.skipped {
            match reason {
                SkipReason::AlreadyCancelled(id) => {
                    debug!(change_id = %change_id, session_id = %id, "Session already cancelled, nothing to do");
                }
                other => {
                    warn!(
                        change_id = %change_id,
                        op = %change.operation,
                        session_id = ?session_id.as_ref().map(SessionId::as_str),
                        reason = %other,
                        "Skipping change"
                    );
                }
            }
        }

        debug!(
            change_id = %change_id,
            op = %change.operation,
            session_id = ?session_id.as_ref().map(SessionId::as_str),
            commit_time = %change.commit_time,
            intents = derivation.intents.len(),
            "Derived schedule intents"
        );

        let report = self.reconciler.apply(&derivation.intents).await;

        if !derivation.intents.is_empty() {
            info!(
                change_id = %change_id,
                op = %change.operation,
                session_id = ?session_id.as_ref().map(SessionId::as_str),
                applied = report.applied.len(),
                failed = report.failures.len(),
                "Change reconciled"
            );
        }

        DispatchOutcome {
            change_id,
            session_id,
            derived: derivation.intents.len(),
            skipped: derivation.skipped,
            report,
        }
    }
}
