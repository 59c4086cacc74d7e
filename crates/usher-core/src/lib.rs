//! Core reconciliation engine for usherd
//!
//! This crate is the heart of usherd, containing:
//! - Schedule derivation (pure: `SessionChange` -> ordered `ScheduleIntent`s)
//! - Reconciliation of intents against an `ExternalScheduler`, with
//!   per-call timeouts and bounded retry
//! - Single-change dispatch (derive then reconcile)
//! - Partitioned dispatch keeping each session single-writer and in order

mod derive;
mod dispatch;
mod partition;
mod reconcile;

pub use derive::*;
pub use dispatch::*;
pub use partition::*;
pub use reconcile::*;
