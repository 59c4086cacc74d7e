//! Time utilities for usherd
//!
//! All wall-clock reads go through the [`Clock`] trait so that tests can pin
//! "now" and relative offsets stay deterministic.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `USHER_MOCK_TIME` environment variable overrides the
//! time reported by [`SystemClock`]. The mock time advances at the same rate
//! as real time from the moment the process first reads the clock.
//!
//! Format: `YYYY-MM-DD HH:MM:SS`, interpreted as UTC (e.g. `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "USHER_MOCK_TIME";

const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive_dt) => {
                        let mock_dt = Utc.from_utc_datetime(&naive_dt);
                        let offset = mock_dt.signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current UTC time, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of the current instant
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time (and `USHER_MOCK_TIME` in debug builds)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// Manually driven clock for tests
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Unit of integer epoch timestamps found in change records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochUnit {
    Seconds,
    #[default]
    Millis,
    Micros,
}

impl EpochUnit {
    /// Convert an integer epoch value to an instant.
    ///
    /// Zero means "unset" and yields `None`, as does any value outside
    /// chrono's representable range.
    pub fn to_datetime(self, value: i64) -> Option<DateTime<Utc>> {
        if value == 0 {
            return None;
        }
        match self {
            EpochUnit::Seconds => DateTime::<Utc>::from_timestamp(value, 0),
            EpochUnit::Millis => DateTime::<Utc>::from_timestamp_millis(value),
            EpochUnit::Micros => DateTime::<Utc>::from_timestamp_micros(value),
        }
    }
}

impl fmt::Display for EpochUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpochUnit::Seconds => "seconds",
            EpochUnit::Millis => "millis",
            EpochUnit::Micros => "micros",
        };
        f.write_str(s)
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if seconds > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn fixed_clock_is_manual() {
        let start = Utc.with_ymd_and_hms(2025, 12, 25, 14, 30, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now(), start + chrono::Duration::hours(2));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn system_clock_returns_plausible_time() {
        let t = SystemClock.now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn epoch_units_convert() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let secs = expected.timestamp();

        assert_eq!(EpochUnit::Seconds.to_datetime(secs), Some(expected));
        assert_eq!(EpochUnit::Millis.to_datetime(secs * 1_000), Some(expected));
        assert_eq!(
            EpochUnit::Micros.to_datetime(secs * 1_000_000),
            Some(expected)
        );
    }

    #[test]
    fn zero_epoch_is_unset() {
        assert_eq!(EpochUnit::Millis.to_datetime(0), None);
        assert_eq!(EpochUnit::Seconds.to_datetime(0), None);
    }

    #[test]
    fn epoch_unit_deserializes_snake_case() {
        let unit: EpochUnit = serde_json::from_str("\"micros\"").unwrap();
        assert_eq!(unit, EpochUnit::Micros);
        assert_eq!(EpochUnit::default(), EpochUnit::Millis);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_parse_mock_time_format() {
        for s in ["2025-12-25 14:30:00", "2025-01-01 00:00:00"] {
            assert!(NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT).is_ok());
        }
        for s in ["2025-12-25", "2025-12-25T14:30:00", ""] {
            assert!(NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT).is_err());
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_is_mock_time_active_in_debug() {
        let _ = is_mock_time_active();
    }
}
