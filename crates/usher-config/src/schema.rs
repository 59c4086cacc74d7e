//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub intake: RawIntakeConfig,

    #[serde(default)]
    pub derivation: RawDerivationConfig,

    #[serde(default)]
    pub scheduler: RawSchedulerConfig,

    #[serde(default)]
    pub reconciler: RawReconcilerConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// NDJSON change stream: a file path, or "-" for stdin (default: "-")
    pub input: Option<String>,

    /// Data directory for the SQLite backend
    pub data_dir: Option<PathBuf>,
}

/// Change intake settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawIntakeConfig {
    /// Number of partition workers (default: 4)
    pub workers: Option<usize>,

    /// Per-worker queue capacity (default: 64)
    pub queue_depth: Option<usize>,

    /// Unit of integer timestamps in change rows: seconds, millis, micros
    pub timestamp_unit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDerivationConfig {
    /// Re-derive SALE_REMINDER when sales_start_time changes (default: false)
    pub rederive_sale_reminder: Option<bool>,
}

/// External scheduler settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedulerConfig {
    /// http, sqlite, or memory (default: sqlite)
    pub backend: Option<String>,

    /// Base URL of the scheduler REST API (http backend)
    pub base_url: Option<String>,

    /// Name of the environment variable holding the bearer token
    pub auth_token_env: Option<String>,

    /// Opaque downstream destination fired triggers deliver to
    pub target: Option<String>,

    /// SQLite database path (default: <data_dir>/schedules.db)
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawReconcilerConfig {
    /// Per-call timeout in milliseconds (default: 10000)
    pub call_timeout_ms: Option<u64>,

    pub retry: Option<RawRetryConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub backoff_coefficient: Option<f64>,
    pub jitter: Option<f64>,
}
