use crate::{Activity, CalendarZone, DayBucket, EventKind, EventSummary};
use chrono::{DateTime, NaiveDate, Utc};

/// Parse `YYYY-MM-DD` (panics on bad input; tests only).
pub fn date(key: &str) -> NaiveDate {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").expect("test date")
}

/// Parse an RFC 3339 instant (panics on bad input; tests only).
pub fn instant(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("test instant")
        .with_timezone(&Utc)
}

/// Activity starting at `start` (RFC 3339) lasting five minutes.
pub fn activity(id: &str, start: &str, version: u64) -> Activity {
    let start_time = instant(start);
    Activity {
        id: id.to_string(),
        title: format!("activity {id}"),
        description: None,
        start_time,
        end_time: start_time + chrono::Duration::minutes(5),
        source_event_ids: Vec::new(),
        event_summaries: None,
        version,
    }
}

/// Activity on `day` (`YYYY-MM-DD`) at `hour`:00 UTC.
pub fn activity_on(id: &str, day: &str, hour: u32, version: u64) -> Activity {
    activity(id, &format!("{day}T{hour:02}:00:00Z"), version)
}

/// Bucket for `day` holding `activities`.
pub fn bucket(day: &str, activities: Vec<Activity>) -> DayBucket {
    DayBucket::from_activities(date(day), activities)
}

/// Bucket for `day` with `count` activities whose ids are `{day}-{n}`.
pub fn filled_bucket(day: &str, count: usize, first_version: u64) -> DayBucket {
    let activities = (0..count)
        .map(|n| {
            activity_on(
                &format!("{day}-{n}"),
                day,
                (n % 24) as u32,
                first_version + n as u64,
            )
        })
        .collect();
    bucket(day, activities)
}

/// Event summary attached to an activity's detail.
pub fn summary(event_id: &str, kind: EventKind, text: &str) -> EventSummary {
    EventSummary {
        event_id: event_id.to_string(),
        kind,
        summary: text.to_string(),
        occurred_at: Utc::now(),
    }
}

/// Calendar zone pinned to UTC so bucket dates do not depend on the host.
pub fn utc_zone() -> CalendarZone {
    CalendarZone::utc()
}
