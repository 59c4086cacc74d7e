//! Resolved settings

use crate::schema::{RawConfig, RawRetryConfig, RawSchedulerConfig};
use crate::validation::{parse_backend, parse_timestamp_unit};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use usher_util::{
    default_data_dir, EpochUnit, RetryPolicy, DEFAULT_CALL_TIMEOUT, DEFAULT_QUEUE_DEPTH,
    DEFAULT_WORKERS,
};

/// Which external scheduler implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerBackend {
    /// REST scheduling service
    Http,
    /// Local SQLite trigger table
    #[default]
    Sqlite,
    /// In-process map, lost on exit (dry runs)
    Memory,
}

impl SchedulerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerBackend::Http => "http",
            SchedulerBackend::Sqlite => "sqlite",
            SchedulerBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for SchedulerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub service: ServiceSettings,
    pub intake: IntakeSettings,
    pub derivation: DerivationSettings,
    pub scheduler: SchedulerSettings,
    pub reconciler: ReconcilerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_raw(RawConfig {
            config_version: crate::CURRENT_CONFIG_VERSION,
            ..Default::default()
        })
    }
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings {
                input: raw.service.input.unwrap_or_else(|| "-".to_string()),
                data_dir: raw.service.data_dir.unwrap_or_else(default_data_dir),
            },
            intake: IntakeSettings {
                workers: raw.intake.workers.unwrap_or(DEFAULT_WORKERS),
                queue_depth: raw.intake.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
                timestamp_unit: raw
                    .intake
                    .timestamp_unit
                    .as_deref()
                    .and_then(|u| parse_timestamp_unit(u).ok())
                    .unwrap_or_default(),
            },
            derivation: DerivationSettings {
                rederive_sale_reminder: raw.derivation.rederive_sale_reminder.unwrap_or(false),
            },
            scheduler: SchedulerSettings::from_raw(raw.scheduler),
            reconciler: ReconcilerSettings {
                call_timeout: raw
                    .reconciler
                    .call_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_CALL_TIMEOUT),
                retry: convert_retry(raw.reconciler.retry.unwrap_or_default()),
            },
        }
    }
}

pub const DEFAULT_TARGET: &str = "usher-notifications";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// File path, or "-" for stdin
    pub input: String,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeSettings {
    pub workers: usize,
    pub queue_depth: usize,
    pub timestamp_unit: EpochUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivationSettings {
    pub rederive_sale_reminder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub backend: SchedulerBackend,
    pub base_url: Option<String>,
    pub auth_token_env: Option<String>,
    pub target: String,
    pub database: Option<PathBuf>,
}

impl SchedulerSettings {
    fn from_raw(raw: RawSchedulerConfig) -> Self {
        Self {
            backend: raw
                .backend
                .as_deref()
                .and_then(|b| parse_backend(b).ok())
                .unwrap_or_default(),
            base_url: raw.base_url,
            auth_token_env: raw.auth_token_env,
            target: raw.target.unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            database: raw.database,
        }
    }

    /// SQLite database location, defaulting into the data directory
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir.join("schedules.db"))
    }

    /// Bearer token read from the configured environment variable, if any
    pub fn auth_token(&self) -> Option<String> {
        let var = self.auth_token_env.as_deref()?;
        std::env::var(var).ok().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerSettings {
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

fn convert_retry(raw: RawRetryConfig) -> RetryPolicy {
    let mut policy = RetryPolicy::exponential();
    if let Some(max_attempts) = raw.max_attempts {
        policy = policy.with_max_attempts(max_attempts);
    }
    if let Some(ms) = raw.initial_interval_ms {
        policy = policy.with_initial_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = raw.max_interval_ms {
        policy = policy.with_max_interval(Duration::from_millis(ms));
    }
    if let Some(coefficient) = raw.backoff_coefficient {
        policy = policy.with_backoff_coefficient(coefficient);
    }
    if let Some(jitter) = raw.jitter {
        policy = policy.with_jitter(jitter);
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything() {
        let settings = Settings::default();
        assert_eq!(settings.service.input, "-");
        assert_eq!(settings.intake.workers, 4);
        assert_eq!(settings.intake.queue_depth, 64);
        assert_eq!(settings.intake.timestamp_unit, EpochUnit::Millis);
        assert!(!settings.derivation.rederive_sale_reminder);
        assert_eq!(settings.scheduler.backend, SchedulerBackend::Sqlite);
        assert_eq!(settings.scheduler.target, DEFAULT_TARGET);
        assert_eq!(settings.reconciler.call_timeout, Duration::from_secs(10));
        assert_eq!(settings.reconciler.retry, RetryPolicy::exponential());
    }

    #[test]
    fn database_defaults_into_data_dir() {
        let scheduler = Settings::default().scheduler;
        assert_eq!(
            scheduler.database_path(Path::new("/var/lib/usherd")),
            PathBuf::from("/var/lib/usherd/schedules.db")
        );
    }

    #[test]
    fn retry_overrides_apply() {
        let policy = convert_retry(RawRetryConfig {
            max_attempts: Some(5),
            initial_interval_ms: Some(50),
            jitter: Some(0.0),
            ..Default::default()
        });
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_interval, Duration::from_millis(50));
        assert_eq!(policy.max_interval, Duration::from_secs(5));
        assert_eq!(policy.jitter, 0.0);
    }
}
