use anyhow::Result;
use daylog_core::{Activity, CalendarZone, DayBucket};
use serde::Serialize;
use std::fmt::Write as _;

/// Output format for query commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `── 2024-06-03 (2) ──` style header for one day.
pub fn day_header(bucket: &DayBucket) -> String {
    let fresh = if bucket.is_fresh { " *new*" } else { "" };
    format!("── {} ({}){fresh} ──", bucket.date_key(), bucket.len())
}

/// One-line summary of an activity: local start time, version, title, id.
pub fn activity_line(activity: &Activity, zone: &CalendarZone) -> String {
    format!(
        "  {}  v{:<5} {}  [{}]",
        zone.time_of(activity.start_time).format("%H:%M"),
        activity.version,
        activity.title,
        activity.id
    )
}

pub fn render_buckets(buckets: &[DayBucket], zone: &CalendarZone) -> String {
    let mut out = String::new();
    for bucket in buckets {
        let _ = writeln!(out, "{}", day_header(bucket));
        for activity in &bucket.activities {
            let _ = writeln!(out, "{}", activity_line(activity, zone));
        }
    }
    out
}

pub fn render_activities(activities: &[Activity], zone: &CalendarZone) -> String {
    let mut out = String::new();
    for activity in activities {
        let _ = writeln!(
            out,
            "{} {}",
            zone.date_of(activity.start_time),
            activity_line(activity, zone).trim_start()
        );
    }
    out
}

pub fn render_detail(activity: &Activity, zone: &CalendarZone) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  [{}]", activity.title, activity.id);
    let _ = writeln!(
        out,
        "  {} {} - {}  (v{})",
        zone.date_of(activity.start_time),
        zone.time_of(activity.start_time).format("%H:%M"),
        zone.time_of(activity.end_time).format("%H:%M"),
        activity.version
    );
    if let Some(description) = &activity.description {
        let _ = writeln!(out, "  {description}");
    }
    match &activity.event_summaries {
        Some(events) if !events.is_empty() => {
            let _ = writeln!(out, "  events:");
            for event in events {
                let _ = writeln!(
                    out,
                    "    {} {:<8} {}",
                    zone.time_of(event.occurred_at).format("%H:%M:%S"),
                    event.kind,
                    event.summary
                );
            }
        }
        _ => {
            let _ = writeln!(out, "  (no events)");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use daylog_core::testing::{activity_on, bucket, summary, utc_zone};
    use daylog_core::EventKind;

    #[test]
    fn buckets_render_header_then_rows() {
        let mut day = bucket(
            "2024-06-01",
            vec![
                activity_on("a", "2024-06-01", 9, 1),
                activity_on("b", "2024-06-01", 14, 2),
            ],
        );
        day.is_fresh = true;
        let text = render_buckets(&[day], &utc_zone());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "── 2024-06-01 (2) *new* ──");
        assert!(lines[1].contains("14:00") && lines[1].ends_with("[b]"));
        assert!(lines[2].contains("09:00") && lines[2].ends_with("[a]"));
    }

    #[test]
    fn detail_lists_events() {
        let mut activity = activity_on("a", "2024-06-01", 9, 1);
        assert!(render_detail(&activity, &utc_zone()).contains("(no events)"));

        activity.event_summaries = Some(vec![summary("e1", EventKind::Keyboard, "typed notes")]);
        let text = render_detail(&activity, &utc_zone());
        assert!(text.contains("keyboard"));
        assert!(text.contains("typed notes"));
    }
}
