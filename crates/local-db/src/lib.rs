pub mod journal;
mod schema;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use daylog_core::{group_by_day, Activity, CalendarZone, DayBucket, EventKind, EventSummary};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

pub use journal::{JournalTailer, PushJournal};
pub use schema::LOCAL_SCHEMA;

/// An activity as handed over by the recorder, before the store assigns a version.
#[derive(Debug, Clone)]
pub struct NewActivity {
    /// Generated when absent
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub events: Vec<EventSummary>,
}

/// Local SQLite activity log.
/// Thread-safe: wraps the connection in a Mutex so it can be shared via `Arc<LocalDb>`.
pub struct LocalDb {
    conn: Mutex<Connection>,
    zone: CalendarZone,
}

impl LocalDb {
    /// Open (or create) the log database at `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir for {}", path.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open db {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(LOCAL_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            zone: CalendarZone::default(),
        })
    }

    /// Day boundaries used when grouping pages into buckets.
    pub fn with_zone(mut self, zone: CalendarZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn zone(&self) -> CalendarZone {
        self.zone
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("local db mutex poisoned")
    }

    // ── Write path (recorder side) ─────────────────────────────────────

    /// Persist a new activity and its event summaries, assigning the next version.
    pub fn record_activity(&self, new: NewActivity) -> Result<Activity> {
        if new.title.trim().is_empty() {
            bail!("activity title must not be empty");
        }
        if new.end_time < new.start_time {
            bail!(
                "activity ends ({}) before it starts ({})",
                new.end_time.to_rfc3339(),
                new.start_time.to_rfc3339()
            );
        }

        let id = new
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let source_event_ids: Vec<String> =
            new.events.iter().map(|e| e.event_id.clone()).collect();
        let source_json = serde_json::to_string(&source_event_ids)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM activities",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO activities \
             (id, title, description, start_time_ms, end_time_ms, source_event_ids, version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &id,
                &new.title,
                &new.description,
                new.start_time.timestamp_millis(),
                new.end_time.timestamp_millis(),
                &source_json,
                version,
            ],
        )
        .with_context(|| format!("insert activity {id}"))?;
        for event in &new.events {
            insert_event_summary(&tx, &id, event)?;
        }
        tx.commit()?;

        debug!(activity_id = %id, version, "activity recorded");
        Ok(Activity {
            id,
            title: new.title,
            description: new.description,
            start_time: new.start_time,
            end_time: new.end_time,
            source_event_ids,
            event_summaries: None,
            version: version as u64,
        })
    }

    /// Attach one more event summary to an existing activity.
    pub fn record_event_summary(&self, activity_id: &str, event: &EventSummary) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ids: Option<String> = tx
            .query_row(
                "SELECT source_event_ids FROM activities WHERE id = ?1",
                params![activity_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(ids) = ids else {
            bail!("unknown activity {activity_id}");
        };
        let mut ids: Vec<String> = serde_json::from_str(&ids)
            .with_context(|| format!("corrupt source_event_ids for activity {activity_id}"))?;
        if !ids.contains(&event.event_id) {
            ids.push(event.event_id.clone());
        }
        tx.execute(
            "UPDATE activities SET source_event_ids = ?1 WHERE id = ?2",
            params![serde_json::to_string(&ids)?, activity_id],
        )?;
        insert_event_summary(&tx, activity_id, event)?;
        tx.commit()?;
        Ok(())
    }

    // ── Read path (paginated reader) ───────────────────────────────────

    /// One page of the timeline, newest first, grouped into day buckets.
    ///
    /// `offset` and `limit` count activity rows; the optional dates bound the
    /// page to an inclusive local-date range.
    pub fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
        date_start: Option<NaiveDate>,
        date_end: Option<NaiveDate>,
    ) -> Result<Vec<DayBucket>> {
        let mut where_clauses = vec!["1=1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1u32;

        let (start, end) = self.zone.range_bounds(date_start, date_end);
        if let Some(start) = start {
            where_clauses.push(format!("start_time_ms >= ?{idx}"));
            param_values.push(Box::new(start.timestamp_millis()));
            idx += 1;
        }
        if let Some(end) = end {
            where_clauses.push(format!("start_time_ms < ?{idx}"));
            param_values.push(Box::new(end.timestamp_millis()));
            idx += 1;
        }

        let where_str = where_clauses.join(" AND ");
        let sql = format!(
            "SELECT id, title, description, start_time_ms, end_time_ms, source_event_ids, version \
             FROM activities WHERE {where_str} \
             ORDER BY start_time_ms DESC, id ASC \
             LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
            limit_idx = idx,
            offset_idx = idx + 1,
        );
        param_values.push(Box::new(limit as i64));
        param_values.push(Box::new(offset as i64));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), row_to_activity)?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }
        Ok(group_by_day(activities, &self.zone))
    }

    /// Activities with `version > since_version`, oldest version first.
    pub fn fetch_increment(&self, since_version: u64, limit: usize) -> Result<Vec<Activity>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, start_time_ms, end_time_ms, source_event_ids, version \
             FROM activities WHERE version > ?1 \
             ORDER BY version ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![since_version as i64, limit as i64],
            row_to_activity,
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Point lookup with event summaries populated.
    pub fn fetch_detail(&self, activity_id: &str) -> Result<Option<Activity>> {
        let conn = self.conn();
        let activity = conn
            .query_row(
                "SELECT id, title, description, start_time_ms, end_time_ms, source_event_ids, version \
                 FROM activities WHERE id = ?1",
                params![activity_id],
                row_to_activity,
            )
            .optional()?;
        let Some(mut activity) = activity else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT event_id, kind, summary, occurred_ms FROM event_summaries \
             WHERE activity_id = ?1 ORDER BY occurred_ms ASC, event_id ASC",
        )?;
        let rows = stmt.query_map(params![activity_id], row_to_event_summary)?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        activity.event_summaries = Some(summaries);
        Ok(Some(activity))
    }

    // ── Diagnostics ────────────────────────────────────────────────────

    pub fn latest_version(&self) -> Result<u64> {
        let version: i64 = self.conn().query_row(
            "SELECT COALESCE(MAX(version), 0) FROM activities",
            [],
            |row| row.get(0),
        )?;
        Ok(version as u64)
    }

    pub fn count_activities(&self) -> Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn insert_event_summary(
    conn: &Connection,
    activity_id: &str,
    event: &EventSummary,
) -> Result<()> {
    conn.execute(
        "INSERT INTO event_summaries (event_id, activity_id, kind, summary, occurred_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(event_id) DO UPDATE SET kind=excluded.kind, summary=excluded.summary, \
         occurred_ms=excluded.occurred_ms",
        params![
            &event.event_id,
            activity_id,
            event.kind.as_str(),
            &event.summary,
            event.occurred_at.timestamp_millis(),
        ],
    )
    .with_context(|| format!("insert event summary {}", event.event_id))?;
    Ok(())
}

fn millis_to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {ms}").into(),
        )
    })
}

fn row_to_activity(row: &rusqlite::Row) -> rusqlite::Result<Activity> {
    let source_json: String = row.get(5)?;
    let source_event_ids: Vec<String> = serde_json::from_str(&source_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let version: i64 = row.get(6)?;
    Ok(Activity {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_time: millis_to_utc(3, row.get(3)?)?,
        end_time: millis_to_utc(4, row.get(4)?)?,
        source_event_ids,
        event_summaries: None,
        version: version as u64,
    })
}

fn row_to_event_summary(row: &rusqlite::Row) -> rusqlite::Result<EventSummary> {
    let kind: String = row.get(1)?;
    Ok(EventSummary {
        event_id: row.get(0)?,
        kind: kind.parse().unwrap_or(EventKind::Other),
        summary: row.get(2)?,
        occurred_at: millis_to_utc(3, row.get(3)?)?,
    })
}
