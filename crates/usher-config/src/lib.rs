//! Configuration parsing and validation for usherd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Intake, derivation, scheduler, and reconciler sections
//! - Validation that reports every problem at once
//! - Resolved settings with defaults filled in

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use usher_util::EpochUnit;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config("config_version = 1").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            input = "/var/spool/usherd/sessions.ndjson"
            data_dir = "/var/lib/usherd"

            [intake]
            workers = 8
            queue_depth = 16
            timestamp_unit = "seconds"

            [derivation]
            rederive_sale_reminder = true

            [scheduler]
            backend = "http"
            base_url = "https://scheduler.internal"
            auth_token_env = "USHER_SCHEDULER_TOKEN"
            target = "queue://session-notifications"

            [reconciler]
            call_timeout_ms = 2500

            [reconciler.retry]
            max_attempts = 4
            initial_interval_ms = 100
            max_interval_ms = 2000
            backoff_coefficient = 3.0
            jitter = 0.2
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.service.input, "/var/spool/usherd/sessions.ndjson");
        assert_eq!(settings.intake.workers, 8);
        assert_eq!(settings.intake.timestamp_unit, EpochUnit::Seconds);
        assert!(settings.derivation.rederive_sale_reminder);
        assert_eq!(settings.scheduler.backend, SchedulerBackend::Http);
        assert_eq!(
            settings.scheduler.base_url.as_deref(),
            Some("https://scheduler.internal")
        );
        assert_eq!(settings.scheduler.target, "queue://session-notifications");
        assert_eq!(settings.reconciler.call_timeout, Duration::from_millis(2500));
        assert_eq!(settings.reconciler.retry.max_attempts, 4);
        assert_eq!(settings.reconciler.retry.backoff_coefficient, 3.0);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = r#"
            config_version = 1

            [scheduler]
            backend = "carrier-pigeon"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(
                    errors,
                    vec![ValidationError::UnknownBackend("carrier-pigeon".into())]
                );
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn reject_base_url_without_host() {
        let config = r#"
            config_version = 1

            [scheduler]
            backend = "http"
            base_url = "https://:80"
            target = "queue://session-notifications"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(errors[0], ValidationError::InvalidUrl { .. }));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1\n[intake]\nworkers = 2").unwrap();

        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.intake.workers, 2);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
