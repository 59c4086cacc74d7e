//! Built-in defaults shared by the core and the config layer

use std::time::Duration;

/// Intake workers when none are configured
pub const DEFAULT_WORKERS: usize = 4;

/// Per-worker queue depth when none is configured
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Bound on a single scheduler call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
