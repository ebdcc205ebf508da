/// Schema for the local activity log. Applied on every open; all statements
/// are idempotent.
pub const LOCAL_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS activities (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    description      TEXT,
    start_time_ms    INTEGER NOT NULL,
    end_time_ms      INTEGER NOT NULL,
    source_event_ids TEXT NOT NULL DEFAULT '[]',
    version          INTEGER NOT NULL UNIQUE,
    recorded_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_activities_timeline
    ON activities (start_time_ms DESC, id ASC);

CREATE TABLE IF NOT EXISTS event_summaries (
    event_id     TEXT PRIMARY KEY,
    activity_id  TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    kind         TEXT NOT NULL,
    summary      TEXT NOT NULL,
    occurred_ms  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_summaries_activity
    ON event_summaries (activity_id, occurred_ms);
";
