//! CDC envelope normalization
//!
//! Accepts Debezium-style envelopes, either schema-wrapped
//! (`{"schema": ..., "payload": {...}}`) or bare (`{"before", "after", "op", ...}`),
//! and turns them into a [`SessionChange`].
//!
//! Snapshot reads (`op = "r"`) and tombstones are reported as
//! [`Normalized::Ignored`] rather than errors: neither should touch the
//! external scheduler.

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use usher_api::{Operation, Session, SessionChange, SessionKind, SessionStatus};
use usher_util::{Clock, EpochUnit, EventId, SessionId, SystemClock};

use crate::{ParseError, ParseResult};

/// Why a well-formed record produced no change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `op = "r"`: initial snapshot replay
    SnapshotRead,
    /// Empty body, JSON `null`, or a `null` payload
    Tombstone,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::SnapshotRead => f.write_str("snapshot read"),
            IgnoreReason::Tombstone => f.write_str("tombstone"),
        }
    }
}

/// Outcome of normalizing one raw record
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Change(SessionChange),
    Ignored(IgnoreReason),
}

impl Normalized {
    pub fn into_change(self) -> Option<SessionChange> {
        match self {
            Normalized::Change(change) => Some(change),
            Normalized::Ignored(_) => None,
        }
    }
}

/// Debezium change event body, after any schema wrapper is removed.
///
/// Row images stay as raw maps: their columns are decoded against the
/// configured epoch unit and report errors by column name.
#[derive(Debug, Deserialize)]
struct Envelope {
    op: Option<String>,
    before: Option<Map<String, Value>>,
    after: Option<Map<String, Value>>,
    ts_ms: Option<Value>,
    source: Option<SourceInfo>,
}

#[derive(Debug, Deserialize)]
struct SourceInfo {
    ts_ms: Option<Value>,
}

/// Parses raw change records into normalized session changes
#[derive(Debug, Clone)]
pub struct Normalizer {
    timestamp_unit: EpochUnit,
    clock: Arc<dyn Clock>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(EpochUnit::default(), Arc::new(SystemClock))
    }
}

impl Normalizer {
    pub fn new(timestamp_unit: EpochUnit, clock: Arc<dyn Clock>) -> Self {
        Self {
            timestamp_unit,
            clock,
        }
    }

    pub fn timestamp_unit(&self) -> EpochUnit {
        self.timestamp_unit
    }

    /// Normalize one record given as raw bytes
    pub fn normalize_bytes(&self, raw: &[u8]) -> ParseResult<Normalized> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Normalized::Ignored(IgnoreReason::Tombstone));
        }
        let value: Value = serde_json::from_slice(raw)?;
        self.normalize_value(value)
    }

    /// Normalize one record given as text
    pub fn normalize(&self, raw: &str) -> ParseResult<Normalized> {
        self.normalize_bytes(raw.as_bytes())
    }

    /// Normalize an already-decoded envelope
    pub fn normalize_value(&self, value: Value) -> ParseResult<Normalized> {
        let body = match value {
            Value::Null => return Ok(Normalized::Ignored(IgnoreReason::Tombstone)),
            Value::Object(mut obj) => match obj.remove("payload") {
                Some(Value::Null) => return Ok(Normalized::Ignored(IgnoreReason::Tombstone)),
                Some(payload @ Value::Object(_)) => payload,
                Some(_) => return Err(ParseError::NotAnObject("payload")),
                None => Value::Object(obj),
            },
            _ => return Err(ParseError::NotAnObject("envelope")),
        };
        let envelope: Envelope = serde_json::from_value(body)?;

        let operation = match envelope.op.as_deref() {
            Some("c") => Operation::Create,
            Some("u") => Operation::Update,
            Some("d") => Operation::Delete,
            Some("r") => return Ok(Normalized::Ignored(IgnoreReason::SnapshotRead)),
            Some(other) => return Err(ParseError::UnknownOperation(other.to_string())),
            None => return Err(ParseError::MissingField("op")),
        };

        let before = envelope
            .before
            .as_ref()
            .map(|row| self.parse_session(row))
            .transpose()?;
        let after = envelope
            .after
            .as_ref()
            .map(|row| self.parse_session(row))
            .transpose()?;
        let commit_time = self.commit_time(&envelope)?;

        let change = match operation {
            Operation::Create => {
                let after = after.ok_or(ParseError::MissingField("after"))?;
                SessionChange::create(after, commit_time)
            }
            Operation::Delete => {
                let before = before.ok_or(ParseError::MissingField("before"))?;
                SessionChange::delete(before, commit_time)
            }
            // A missing side is carried through; derivation treats it as degenerate
            Operation::Update => SessionChange {
                before,
                after,
                operation,
                commit_time,
            },
        };

        trace!(
            op = %change.operation,
            session_id = ?change.session_id().map(SessionId::as_str),
            "Normalized change record"
        );

        Ok(Normalized::Change(change))
    }

    fn parse_session(&self, row: &Map<String, Value>) -> ParseResult<Session> {
        let id = opaque_id(row.get("id"), "id")?.ok_or(ParseError::MissingField("id"))?;
        let event_id = opaque_id(row.get("event_id"), "event_id")?.unwrap_or_default();

        let status = match row.get("status") {
            None | Some(Value::Null) => SessionStatus::default(),
            Some(Value::String(s)) => SessionStatus::from(s.as_str()),
            Some(_) => return Err(ParseError::wrong_type("status", "string")),
        };

        let kind = match row.get("session_type") {
            None | Some(Value::Null) => SessionKind::default(),
            Some(Value::String(s)) => SessionKind::from(s.clone()),
            Some(_) => return Err(ParseError::wrong_type("session_type", "string")),
        };

        let venue = match row.get("venue") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        };

        Ok(Session {
            id: SessionId::new(id),
            event_id: EventId::new(event_id),
            start_time: self.column_timestamp(row, "start_time")?,
            end_time: self.column_timestamp(row, "end_time")?,
            sales_start_time: self.column_timestamp(row, "sales_start_time")?,
            status,
            venue,
            kind,
        })
    }

    fn column_timestamp(
        &self,
        row: &Map<String, Value>,
        field: &'static str,
    ) -> ParseResult<Option<DateTime<Utc>>> {
        parse_timestamp(row.get(field), field, self.timestamp_unit)
    }

    /// `source.ts_ms`, then the envelope `ts_ms`, then the clock.
    /// Both envelope fields are always milliseconds.
    fn commit_time(&self, envelope: &Envelope) -> ParseResult<DateTime<Utc>> {
        let source_ts = envelope.source.as_ref().and_then(|s| s.ts_ms.as_ref());

        if let Some(ts) = parse_timestamp(source_ts, "source.ts_ms", EpochUnit::Millis)? {
            return Ok(ts);
        }
        if let Some(ts) = parse_timestamp(envelope.ts_ms.as_ref(), "ts_ms", EpochUnit::Millis)? {
            return Ok(ts);
        }
        Ok(self.clock.now())
    }
}

/// Read an identifier that may arrive as a string or an integer
fn opaque_id(value: Option<&Value>, field: &'static str) -> ParseResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(_) => Err(ParseError::wrong_type(field, "string or integer")),
    }
}

/// Parse a timestamp column. `null`, `0`, `""` and the zero instant are unset.
fn parse_timestamp(
    value: Option<&Value>,
    field: &'static str,
    unit: EpochUnit,
) -> ParseResult<Option<DateTime<Utc>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let raw = n
                .as_i64()
                .ok_or_else(|| ParseError::wrong_type(field, "integer epoch"))?;
            epoch(raw, field, unit)
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if let Ok(raw) = s.parse::<i64>() {
                return epoch(raw, field, unit);
            }
            let parsed = DateTime::parse_from_rfc3339(s)
                .map_err(|e| ParseError::invalid_timestamp(field, e.to_string()))?
                .with_timezone(&Utc);
            if is_zero_instant(&parsed) {
                Ok(None)
            } else {
                Ok(Some(parsed))
            }
        }
        Some(_) => Err(ParseError::wrong_type(
            field,
            "integer epoch or RFC 3339 string",
        )),
    }
}

fn epoch(raw: i64, field: &'static str, unit: EpochUnit) -> ParseResult<Option<DateTime<Utc>>> {
    if raw == 0 {
        return Ok(None);
    }
    unit.to_datetime(raw)
        .map(Some)
        .ok_or_else(|| ParseError::invalid_timestamp(field, format!("{raw} {unit} is out of range")))
}

/// The Unix epoch and `0001-01-01T00:00:00Z` both mean "never set"
fn is_zero_instant(at: &DateTime<Utc>) -> bool {
    (at.timestamp() == 0 && at.timestamp_subsec_nanos() == 0) || at.year() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use usher_util::FixedClock;

    fn clock_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(EpochUnit::Millis, Arc::new(FixedClock::new(clock_time())))
    }

    fn change(raw: &str) -> SessionChange {
        normalizer()
            .normalize(raw)
            .unwrap()
            .into_change()
            .expect("expected a change")
    }

    #[test]
    fn schema_wrapped_create() {
        let raw = r#"{
            "schema": {"type": "struct"},
            "payload": {
                "before": null,
                "after": {
                    "id": "s1",
                    "event_id": "e1",
                    "start_time": "2025-04-10T20:00:00Z",
                    "end_time": 1744322400000,
                    "sales_start_time": 0,
                    "status": "ON_SALE",
                    "venue": {"name": "Main Hall"},
                    "session_type": "PHYSICAL"
                },
                "op": "c",
                "ts_ms": 1740830400000,
                "source": {"ts_ms": 1740830399000}
            }
        }"#;

        let change = change(raw);
        assert_eq!(change.operation, Operation::Create);
        assert!(change.before.is_none());

        let after = change.after.unwrap();
        assert_eq!(after.id.as_str(), "s1");
        assert_eq!(after.event_id.as_str(), "e1");
        assert_eq!(
            after.start_time,
            Some(Utc.with_ymd_and_hms(2025, 4, 10, 20, 0, 0).unwrap())
        );
        assert_eq!(
            after.end_time,
            Some(Utc.with_ymd_and_hms(2025, 4, 10, 22, 0, 0).unwrap())
        );
        assert_eq!(after.sales_start_time, None);
        assert_eq!(after.status, SessionStatus::OnSale);
        assert_eq!(after.venue.unwrap()["name"], "Main Hall");

        // source.ts_ms wins over the envelope ts_ms
        assert_eq!(change.commit_time.timestamp_millis(), 1740830399000);
    }

    #[test]
    fn bare_update_with_integer_id() {
        let raw = r#"{
            "before": {"id": 42, "status": "PENDING", "start_time": null},
            "after": {"id": 42, "status": "CANCELLED", "start_time": ""},
            "op": "u",
            "ts_ms": 1740830400000
        }"#;

        let change = change(raw);
        assert_eq!(change.operation, Operation::Update);
        assert_eq!(change.session_id().unwrap().as_str(), "42");
        assert!(change.after.as_ref().unwrap().status.is_cancelled());
        assert_eq!(change.after.unwrap().start_time, None);
    }

    #[test]
    fn commit_time_falls_back_to_clock() {
        let change = change(r#"{"before": {"id": "s1"}, "op": "d"}"#);
        assert_eq!(change.operation, Operation::Delete);
        assert_eq!(change.commit_time, clock_time());
    }

    #[test]
    fn degenerate_update_is_carried_through() {
        let change = change(r#"{"after": {"id": "s1"}, "op": "u"}"#);
        assert!(change.is_degenerate());
    }

    #[test]
    fn snapshot_reads_and_tombstones_are_ignored() {
        let n = normalizer();
        assert_eq!(
            n.normalize(r#"{"after": {"id": "s1"}, "op": "r"}"#).unwrap(),
            Normalized::Ignored(IgnoreReason::SnapshotRead)
        );
        for raw in ["", "   ", "null", r#"{"schema": {}, "payload": null}"#] {
            assert_eq!(
                n.normalize(raw).unwrap(),
                Normalized::Ignored(IgnoreReason::Tombstone),
                "input {raw:?}"
            );
        }
    }

    #[test]
    fn epoch_unit_is_configurable() {
        let n = Normalizer::new(EpochUnit::Seconds, Arc::new(FixedClock::new(clock_time())));
        let change = n
            .normalize(r#"{"after": {"id": "s1", "end_time": 1744322400}, "op": "c"}"#)
            .unwrap()
            .into_change()
            .unwrap();
        assert_eq!(
            change.after.unwrap().end_time,
            Some(Utc.with_ymd_and_hms(2025, 4, 10, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn zero_instant_strings_are_unset() {
        let change = change(
            r#"{"after": {"id": "s1", "start_time": "0001-01-01T00:00:00Z",
                "end_time": "1970-01-01T00:00:00Z"}, "op": "c"}"#,
        );
        let after = change.after.unwrap();
        assert_eq!(after.start_time, None);
        assert_eq!(after.end_time, None);
    }

    #[test]
    fn row_errors_name_the_field() {
        let n = normalizer();

        assert_eq!(
            n.normalize(r#"{"after": {"event_id": "e1"}, "op": "c"}"#),
            Err(ParseError::MissingField("id"))
        );
        assert_eq!(
            n.normalize(r#"{"after": {"id": "s1"}, "op": "x"}"#),
            Err(ParseError::UnknownOperation("x".into()))
        );
        assert_eq!(
            n.normalize(r#"{"before": {"id": "s1"}, "op": "c"}"#),
            Err(ParseError::MissingField("after"))
        );
        assert_eq!(
            n.normalize(r#"{"after": {"id": "s1"}, "op": "d"}"#),
            Err(ParseError::MissingField("before"))
        );
        assert_eq!(
            n.normalize(r#"{"after": {"id": "s1", "status": 3}, "op": "c"}"#),
            Err(ParseError::wrong_type("status", "string"))
        );
        assert!(matches!(
            n.normalize(r#"{"after": {"id": "s1", "end_time": "next tuesday"}, "op": "c"}"#),
            Err(ParseError::InvalidTimestamp { field: "end_time", .. })
        ));
        assert!(matches!(n.normalize("{not json"), Err(ParseError::Json(_))));
        assert_eq!(n.normalize("[1, 2]"), Err(ParseError::NotAnObject("envelope")));
        assert!(matches!(
            n.normalize(r#"{"after": "s1", "op": "c"}"#),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            n.normalize(r#"{"after": {"id": "s1"}, "op": 1}"#),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_a_json_error() {
        let raw = b"{\"after\": {\"id\": \"s\xff\"}, \"op\": \"c\"}";
        assert!(matches!(
            normalizer().normalize_bytes(raw),
            Err(ParseError::Json(_))
        ));
    }
}
