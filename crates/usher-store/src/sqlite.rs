//! SQLite-based scheduler implementation
//!
//! rusqlite is blocking, so the `ExternalScheduler` calls run on tokio's
//! blocking pool and a caller's timeout can fire while a write waits on the
//! connection. A timed-out write still completes in the background.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use usher_api::ScheduleName;
use usher_scheduler_api::{
    ExternalScheduler, SchedulerError, SchedulerResult, TriggerPayload, UpsertRequest,
};
use usher_util::SessionId;

use crate::{StoreError, StoreResult};

/// A trigger row as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub name: String,
    pub session_id: SessionId,
    pub action_label: String,
    pub fire_at: DateTime<Utc>,
    pub target: String,
    pub description: String,
    pub payload: TriggerPayload,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "name, session_id, action_label, fire_at, target, description, payload_json, updated_at";

/// Fixed-width RFC 3339 with nanoseconds, so text order is time order
fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(column: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("{column} '{raw}': {e}")))
}

/// SQLite-backed scheduler. Clones share one connection.
#[derive(Clone)]
pub struct SqliteScheduler {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScheduler {
    /// Open or create a scheduler database at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory scheduler (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schedules (
                name TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                action_label TEXT NOT NULL,
                fire_at TEXT NOT NULL,
                target TEXT NOT NULL,
                description TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_schedules_session ON schedules(session_id);
            CREATE INDEX IF NOT EXISTS idx_schedules_fire_at ON schedules(fire_at);
            "#,
        )?;

        debug!("Scheduler schema initialized");
        Ok(())
    }

    /// Insert or replace the trigger named in `request`
    pub fn put_trigger(&self, request: &UpsertRequest) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let payload_json = serde_json::to_string(&request.payload)?;
        let name = request.name.to_string();

        conn.execute(
            r#"
            INSERT INTO schedules
                (name, session_id, action_label, fire_at, target, description, payload_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                session_id = excluded.session_id,
                action_label = excluded.action_label,
                fire_at = excluded.fire_at,
                target = excluded.target,
                description = excluded.description,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at
            "#,
            params![
                name,
                request.name.session_id().as_str(),
                request.action_label,
                encode_time(request.fire_at),
                request.target,
                request.description,
                payload_json,
                encode_time(usher_util::now()),
            ],
        )?;

        debug!(name = %name, fire_at = %request.fire_at, "Trigger stored");
        Ok(())
    }

    /// Remove a trigger. Returns whether a row existed.
    pub fn remove_trigger(&self, name: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM schedules WHERE name = ?", [name])?;
        debug!(name = %name, removed, "Trigger removed");
        Ok(removed > 0)
    }

    pub fn get(&self, name: &str) -> StoreResult<Option<ScheduledTrigger>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM schedules WHERE name = ?", SELECT_COLUMNS);

        let raw = conn
            .query_row(&sql, [name], read_raw_row)
            .optional()?;

        raw.map(RawTriggerRow::into_trigger).transpose()
    }

    /// All triggers belonging to one session, ordered by fire time
    pub fn list_for_session(&self, session_id: &SessionId) -> StoreResult<Vec<ScheduledTrigger>> {
        let sql = format!(
            "SELECT {} FROM schedules WHERE session_id = ? ORDER BY fire_at, name",
            SELECT_COLUMNS
        );
        self.query_triggers(&sql, [session_id.as_str()])
    }

    /// Triggers whose fire time is at or before `at`, ordered by fire time
    pub fn due_before(&self, at: DateTime<Utc>) -> StoreResult<Vec<ScheduledTrigger>> {
        let sql = format!(
            "SELECT {} FROM schedules WHERE fire_at <= ? ORDER BY fire_at, name",
            SELECT_COLUMNS
        );
        self.query_triggers(&sql, [encode_time(at)])
    }

    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn query_triggers<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> StoreResult<Vec<ScheduledTrigger>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_raw_row)?;

        let mut triggers = Vec::new();
        for row in rows {
            triggers.push(row?.into_trigger()?);
        }
        Ok(triggers)
    }
}

struct RawTriggerRow {
    name: String,
    session_id: String,
    action_label: String,
    fire_at: String,
    target: String,
    description: String,
    payload_json: String,
    updated_at: String,
}

fn read_raw_row(row: &Row<'_>) -> rusqlite::Result<RawTriggerRow> {
    Ok(RawTriggerRow {
        name: row.get(0)?,
        session_id: row.get(1)?,
        action_label: row.get(2)?,
        fire_at: row.get(3)?,
        target: row.get(4)?,
        description: row.get(5)?,
        payload_json: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl RawTriggerRow {
    fn into_trigger(self) -> StoreResult<ScheduledTrigger> {
        let fire_at = decode_time("fire_at", &self.fire_at)?;
        let updated_at = decode_time("updated_at", &self.updated_at)?;
        let payload: TriggerPayload = serde_json::from_str(&self.payload_json)?;

        Ok(ScheduledTrigger {
            name: self.name,
            session_id: SessionId::new(self.session_id),
            action_label: self.action_label,
            fire_at,
            target: self.target,
            description: self.description,
            payload,
            updated_at,
        })
    }
}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        SchedulerError::internal(e.to_string())
    }
}

#[async_trait]
impl ExternalScheduler for SqliteScheduler {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, request: &UpsertRequest) -> SchedulerResult<()> {
        let request = request.clone();
        self.run_blocking(move |store| store.put_trigger(&request))
            .await
    }

    async fn delete(&self, name: &ScheduleName) -> SchedulerResult<()> {
        let name = name.to_string();
        self.run_blocking(move |store| store.remove_trigger(&name).map(|_| ()))
            .await
    }
}

impl SqliteScheduler {
    async fn run_blocking<T, F>(&self, op: F) -> SchedulerResult<T>
    where
        F: FnOnce(&SqliteScheduler) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| SchedulerError::internal(format!("store task failed: {e}")))?
            .map_err(SchedulerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use usher_api::{ScheduleIntent, ScheduleKind, Session};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, hour, 0, 0).unwrap()
    }

    fn request(kind: ScheduleKind, session_id: &str, fire_at: DateTime<Utc>) -> UpsertRequest {
        let session = Session::new(session_id).with_event_id("e1");
        let intent = ScheduleIntent::upsert(kind, &session, fire_at);
        UpsertRequest::from_intent(&intent, "queue://notify").unwrap()
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row() {
        let store = SqliteScheduler::in_memory().unwrap();

        store
            .upsert(&request(ScheduleKind::OnSale, "s1", at(8)))
            .await
            .unwrap();
        store
            .upsert(&request(ScheduleKind::OnSale, "s1", at(9)))
            .await
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let row = store.get("on-sale-s1").unwrap().unwrap();
        assert_eq!(row.fire_at, at(9));
        assert_eq!(row.session_id.as_str(), "s1");
        assert_eq!(row.payload.action_label, "ON_SALE");
        assert_eq!(row.description, "ON_SALE for session s1 of event e1");
    }

    #[tokio::test]
    async fn delete_missing_name_succeeds() {
        let store = SqliteScheduler::in_memory().unwrap();
        let name = ScheduleName::new(ScheduleKind::Closed, "ghost".into());
        store.delete(&name).await.unwrap();
        assert!(!store.remove_trigger("closed-ghost").unwrap());
    }

    #[tokio::test]
    async fn list_and_due_queries() {
        let store = SqliteScheduler::in_memory().unwrap();
        store
            .upsert(&request(ScheduleKind::Closed, "s1", at(22)))
            .await
            .unwrap();
        store
            .upsert(&request(ScheduleKind::OnSale, "s1", at(6)))
            .await
            .unwrap();
        store
            .upsert(&request(ScheduleKind::OnSale, "s2", at(7)))
            .await
            .unwrap();

        let s1 = store.list_for_session(&SessionId::new("s1")).unwrap();
        let names: Vec<_> = s1.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["on-sale-s1", "closed-s1"]);

        let due = store.due_before(at(7)).unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn sub_millisecond_fire_times_round_trip() {
        let store = SqliteScheduler::in_memory().unwrap();
        let early = at(8) + chrono::Duration::microseconds(1_250);
        let later = at(8) + chrono::Duration::nanoseconds(1_250_001);

        store
            .upsert(&request(ScheduleKind::OnSale, "s1", early))
            .await
            .unwrap();
        store
            .upsert(&request(ScheduleKind::Closed, "s1", later))
            .await
            .unwrap();

        assert_eq!(store.get("on-sale-s1").unwrap().unwrap().fire_at, early);
        assert_eq!(store.get("closed-s1").unwrap().unwrap().fire_at, later);

        let due = store.due_before(early).unwrap();
        let names: Vec<_> = due.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["on-sale-s1"]);
    }

    #[tokio::test]
    async fn busy_connection_does_not_block_the_caller() {
        let store = SqliteScheduler::in_memory().unwrap();
        let req = request(ScheduleKind::OnSale, "s1", at(8));

        let guard = store.conn.lock().unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), store.upsert(&req)).await;
        assert!(result.is_err(), "upsert should still be waiting on the connection");
        drop(guard);

        // The timed-out write finishes in the background; the retry is idempotent
        store.upsert(&req).await.unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("on-sale-s1").unwrap().unwrap().fire_at, at(8));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.db");

        {
            let store = SqliteScheduler::open(&path).unwrap();
            store
                .put_trigger(&request(ScheduleKind::SaleReminder, "s3", at(5)))
                .unwrap();
        }

        let store = SqliteScheduler::open(&path).unwrap();
        assert!(store.get("sale-reminder-s3").unwrap().is_some());
    }
}
