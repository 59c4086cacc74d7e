//! Configuration validation

use crate::schema::{RawConfig, RawRetryConfig, RawSchedulerConfig};
use crate::SchedulerBackend;
use thiserror::Error;
use url::Url;
use usher_util::EpochUnit;

/// Validation error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("{field} is required when {reason}")]
    MissingField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Unknown scheduler backend '{0}' (expected http, sqlite, or memory)")]
    UnknownBackend(String),

    #[error("Unknown timestamp unit '{0}' (expected seconds, millis, or micros)")]
    UnknownTimestampUnit(String),

    #[error("Invalid base_url '{value}': {message}")]
    InvalidUrl { value: String, message: String },
}

impl ValidationError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(input) = &config.service.input
        && input.trim().is_empty()
    {
        errors.push(ValidationError::invalid(
            "service.input",
            "cannot be empty (use \"-\" for stdin)",
        ));
    }

    if config.intake.workers == Some(0) {
        errors.push(ValidationError::invalid("intake.workers", "must be at least 1"));
    }
    if config.intake.queue_depth == Some(0) {
        errors.push(ValidationError::invalid(
            "intake.queue_depth",
            "must be at least 1",
        ));
    }
    if let Some(unit) = &config.intake.timestamp_unit
        && let Err(e) = parse_timestamp_unit(unit)
    {
        errors.push(e);
    }

    errors.extend(validate_scheduler(&config.scheduler));

    if config.reconciler.call_timeout_ms == Some(0) {
        errors.push(ValidationError::invalid(
            "reconciler.call_timeout_ms",
            "must be greater than 0",
        ));
    }
    if let Some(retry) = &config.reconciler.retry {
        errors.extend(validate_retry(retry));
    }

    errors
}

fn validate_scheduler(scheduler: &RawSchedulerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let backend = match scheduler.backend.as_deref().map(parse_backend) {
        Some(Ok(backend)) => backend,
        Some(Err(e)) => {
            errors.push(e);
            return errors;
        }
        None => SchedulerBackend::default(),
    };

    if backend == SchedulerBackend::Http {
        match &scheduler.base_url {
            Some(url) => {
                if let Err(e) = check_base_url(url) {
                    errors.push(e);
                }
            }
            None => errors.push(ValidationError::MissingField {
                field: "scheduler.base_url",
                reason: "backend = \"http\"",
            }),
        }
        if scheduler.target.is_none() {
            errors.push(ValidationError::MissingField {
                field: "scheduler.target",
                reason: "backend = \"http\"",
            });
        }
    }

    if let Some(target) = &scheduler.target
        && target.trim().is_empty()
    {
        errors.push(ValidationError::invalid("scheduler.target", "cannot be empty"));
    }

    if let Some(var) = &scheduler.auth_token_env
        && var.trim().is_empty()
    {
        errors.push(ValidationError::invalid(
            "scheduler.auth_token_env",
            "cannot be empty",
        ));
    }

    errors
}

fn validate_retry(retry: &RawRetryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if retry.max_attempts == Some(0) {
        errors.push(ValidationError::invalid(
            "reconciler.retry.max_attempts",
            "must be at least 1",
        ));
    }

    if let (Some(initial), Some(max)) = (retry.initial_interval_ms, retry.max_interval_ms)
        && initial > max
    {
        errors.push(ValidationError::invalid(
            "reconciler.retry.initial_interval_ms",
            format!("{}ms exceeds max_interval_ms {}ms", initial, max),
        ));
    }

    if let Some(coefficient) = retry.backoff_coefficient
        && !(coefficient >= 1.0 && coefficient.is_finite())
    {
        errors.push(ValidationError::invalid(
            "reconciler.retry.backoff_coefficient",
            "must be a finite number >= 1.0",
        ));
    }

    if let Some(jitter) = retry.jitter
        && !(0.0..=1.0).contains(&jitter)
    {
        errors.push(ValidationError::invalid(
            "reconciler.retry.jitter",
            "must be between 0.0 and 1.0",
        ));
    }

    errors
}

/// Parse a scheduler backend name
pub fn parse_backend(s: &str) -> Result<SchedulerBackend, ValidationError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "http" => Ok(SchedulerBackend::Http),
        "sqlite" => Ok(SchedulerBackend::Sqlite),
        "memory" => Ok(SchedulerBackend::Memory),
        _ => Err(ValidationError::UnknownBackend(s.to_string())),
    }
}

/// Parse an epoch unit name
pub fn parse_timestamp_unit(s: &str) -> Result<EpochUnit, ValidationError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "seconds" | "s" => Ok(EpochUnit::Seconds),
        "millis" | "ms" => Ok(EpochUnit::Millis),
        "micros" | "us" => Ok(EpochUnit::Micros),
        _ => Err(ValidationError::UnknownTimestampUnit(s.to_string())),
    }
}

/// Parsed the same way the HTTP adapter parses it at startup
fn check_base_url(url: &str) -> Result<(), ValidationError> {
    let invalid = |message: String| ValidationError::InvalidUrl {
        value: url.to_string(),
        message,
    };

    let parsed = Url::parse(url.trim_end_matches('/')).map_err(|e| invalid(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "scheme must be http or https, got '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if parsed.cannot_be_a_base() {
        return Err(invalid("cannot carry a path".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawIntakeConfig, RawReconcilerConfig};

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("HTTP").unwrap(), SchedulerBackend::Http);
        assert_eq!(parse_backend("sqlite").unwrap(), SchedulerBackend::Sqlite);
        assert_eq!(parse_backend("memory").unwrap(), SchedulerBackend::Memory);
        assert!(parse_backend("eventbridge").is_err());
    }

    #[test]
    fn test_parse_timestamp_unit() {
        assert_eq!(parse_timestamp_unit("seconds").unwrap(), EpochUnit::Seconds);
        assert_eq!(parse_timestamp_unit("ms").unwrap(), EpochUnit::Millis);
        assert_eq!(parse_timestamp_unit("Micros").unwrap(), EpochUnit::Micros);
        assert!(parse_timestamp_unit("nanos").is_err());
    }

    #[test]
    fn test_base_url_checks() {
        assert!(check_base_url("https://scheduler.internal").is_ok());
        assert!(check_base_url("http://localhost:8080/v1/").is_ok());
        assert!(check_base_url("ftp://scheduler").is_err());
        assert!(check_base_url("https://:80").is_err());
        assert!(check_base_url("scheduler.internal").is_err());
        assert!(check_base_url("http://exa mple.com").is_err());
    }

    #[test]
    fn test_http_backend_requires_url_and_target() {
        let config = RawConfig {
            config_version: 1,
            scheduler: RawSchedulerConfig {
                backend: Some("http".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::MissingField { .. })));
    }

    #[test]
    fn test_collects_all_errors() {
        let config = RawConfig {
            config_version: 1,
            intake: RawIntakeConfig {
                workers: Some(0),
                queue_depth: Some(0),
                timestamp_unit: Some("fortnights".into()),
            },
            reconciler: RawReconcilerConfig {
                call_timeout_ms: Some(0),
                retry: Some(RawRetryConfig {
                    max_attempts: Some(0),
                    initial_interval_ms: Some(10_000),
                    max_interval_ms: Some(100),
                    backoff_coefficient: Some(0.5),
                    jitter: Some(2.0),
                }),
            },
            ..Default::default()
        };

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 8, "{errors:#?}");
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::UnknownTimestampUnit(_)))
        );
    }
}
