//! Data model for usherd
//!
//! This crate defines the types shared by every stage of the pipeline:
//! - Session snapshots and their status/kind enumerations
//! - Normalized change records (before/after/operation)
//! - Schedule kinds, deterministic schedule names, and intents

mod change;
mod schedule;
mod types;

pub use change::*;
pub use schedule::*;
pub use types::*;
