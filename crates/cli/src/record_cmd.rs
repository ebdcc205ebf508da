use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use daylog_core::{EventKind, EventSummary, PushNotification};
use daylog_local_db::NewActivity;
use daylog_runtime_config::DaylogConfig;
use tracing::warn;

use crate::output::{self, OutputFormat};
use crate::store;

#[derive(Debug, Clone, Args)]
pub struct RecordArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Start instant (RFC 3339); defaults to now
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// End instant (RFC 3339); defaults to the start
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    /// Explicit activity id; a random one is assigned otherwise
    #[arg(long)]
    pub id: Option<String>,

    /// Raw event folded into the activity, as KIND:SUMMARY (repeatable)
    #[arg(long = "event", value_name = "KIND:SUMMARY")]
    pub events: Vec<String>,

    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

pub fn run(config: &DaylogConfig, args: RecordArgs) -> Result<()> {
    let start_time = args.start.unwrap_or_else(Utc::now);
    let end_time = args.end.unwrap_or(start_time);
    let events = args
        .events
        .iter()
        .map(|raw| parse_event(raw, start_time))
        .collect::<Result<Vec<_>>>()?;

    let db = store::open_db(config)?;
    let activity = db.record_activity(NewActivity {
        id: args.id,
        title: args.title,
        description: args.description,
        start_time,
        end_time,
        events,
    })?;

    // the activity is durable at this point; a journal failure only delays viewers
    let journal = store::journal(config)?;
    let push = PushNotification::activity_persisted(activity.id.clone(), activity.version);
    if let Err(e) = journal.append(&push) {
        warn!(
            "Failed to notify viewers via {}: {e:#}",
            journal.path().display()
        );
    }

    match args.format {
        OutputFormat::Json => output::print_json(&activity),
        OutputFormat::Text => {
            print!("{}", output::render_detail(&activity, &db.zone()));
            Ok(())
        }
    }
}

/// Parse `KIND:SUMMARY` into an event occurring at `occurred_at`.
fn parse_event(raw: &str, occurred_at: DateTime<Utc>) -> Result<EventSummary> {
    let (kind, summary) = raw
        .split_once(':')
        .with_context(|| format!("event {raw:?} must look like KIND:SUMMARY"))?;
    let kind: EventKind = kind.parse()?;
    let summary = summary.trim();
    if summary.is_empty() {
        anyhow::bail!("event {raw:?} has an empty summary");
    }
    Ok(EventSummary {
        event_id: uuid::Uuid::new_v4().to_string(),
        kind,
        summary: summary.to_string(),
        occurred_at,
    })
}
