use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A grouped unit of on-device activity, built by the recorder from raw events.
///
/// Activities are immutable once persisted. The only fields that change after a
/// fetch are the lazily loaded `event_summaries`, which are merged in by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Opaque identifier assigned by the recorder
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Raw events this activity was grouped from
    #[serde(default)]
    pub source_event_ids: Vec<String>,
    /// `None` until the detail has been fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_summaries: Option<Vec<EventSummary>>,
    /// Store-assigned, strictly increasing across persisted activities
    pub version: u64,
}

impl Activity {
    /// Merge lazily fetched detail into this activity.
    ///
    /// Only the detail fields are taken from `detail`; title, times and version
    /// stay as they were when the activity was first cached.
    pub fn merge_detail(&mut self, detail: &Activity) {
        if detail.event_summaries.is_some() {
            self.event_summaries = detail.event_summaries.clone();
        }
        if self.source_event_ids.is_empty() && !detail.source_event_ids.is_empty() {
            self.source_event_ids = detail.source_event_ids.clone();
        }
    }

    pub fn has_detail(&self) -> bool {
        self.event_summaries.is_some()
    }
}

/// Timeline order: `start_time` descending, ties broken by `id` ascending.
pub fn newest_first(a: &Activity, b: &Activity) -> Ordering {
    b.start_time
        .cmp(&a.start_time)
        .then_with(|| a.id.cmp(&b.id))
}

/// One raw input/screen event folded into an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: String,
    pub kind: EventKind,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Keyboard,
    Mouse,
    Screen,
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
            Self::Screen => "screen",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyboard" | "key" => Ok(Self::Keyboard),
            "mouse" => Ok(Self::Mouse),
            "screen" => Ok(Self::Screen),
            "other" => Ok(Self::Other),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn activity(id: &str, hour: u32, version: u64) -> Activity {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap();
        Activity {
            id: id.to_string(),
            title: format!("activity {id}"),
            description: None,
            start_time: start,
            end_time: start,
            source_event_ids: Vec::new(),
            event_summaries: None,
            version,
        }
    }

    #[test]
    fn newest_first_orders_by_start_then_id() {
        let mut list = vec![activity("b", 9, 1), activity("a", 9, 2), activity("c", 12, 3)];
        list.sort_by(newest_first);
        let ids: Vec<_> = list.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn merge_detail_keeps_cached_fields() {
        let mut cached = activity("a1", 10, 4);
        let mut detail = activity("a1", 10, 4);
        detail.title = "changed upstream".to_string();
        detail.source_event_ids = vec!["e1".to_string()];
        detail.event_summaries = Some(vec![EventSummary {
            event_id: "e1".to_string(),
            kind: EventKind::Keyboard,
            summary: "typed in editor".to_string(),
            occurred_at: detail.start_time,
        }]);

        cached.merge_detail(&detail);

        assert_eq!(cached.title, "activity a1");
        assert!(cached.has_detail());
        assert_eq!(cached.source_event_ids, vec!["e1".to_string()]);
    }

    #[test]
    fn event_kind_parses_aliases_and_rejects_unknown() {
        assert_eq!("Key".parse::<EventKind>(), Ok(EventKind::Keyboard));
        assert_eq!("screen".parse::<EventKind>(), Ok(EventKind::Screen));
        assert!("touchpad".parse::<EventKind>().is_err());
    }

    #[test]
    fn unknown_event_kind_deserializes_as_other() {
        let kind: EventKind = serde_json::from_str("\"gamepad\"").unwrap();
        assert_eq!(kind, EventKind::Other);
    }
}
