//! Shared utilities for usherd
//!
//! This crate provides:
//! - ID types (SessionId, EventId, ChangeId)
//! - Time utilities (injectable clocks, epoch conversions)
//! - Retry policy with exponential backoff
//! - Default paths for config and data directories
//! - Built-in defaults for intake and scheduler calls

mod defaults;
mod ids;
mod paths;
mod retry;
mod time;

pub use defaults::*;
pub use ids::*;
pub use paths::*;
pub use retry::*;
pub use time::*;
