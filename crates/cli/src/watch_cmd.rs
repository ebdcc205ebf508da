//! `daylog watch`: a headless live timeline.
//!
//! Mounts the sync engine over the local log, follows the push journal, and
//! reads scroll commands from stdin. Every snapshot change is rendered as the
//! rows currently inside the viewport plus a status line.

use anyhow::{bail, Context, Result};
use daylog_core::CalendarZone;
use daylog_runtime_config::DaylogConfig;
use daylog_timeline::{mount_timeline, LocalDbReader, TimelineSnapshot};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::output::{activity_line, day_header};
use crate::push_feed;
use crate::store;
use crate::viewport::{HeadlessViewport, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Up,
    Down,
    Top,
    Bottom,
    Refresh,
    Expand(String),
    Ack,
    Quit,
}

impl WatchCommand {
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(None);
        };
        let command = match word {
            "up" | "k" => Self::Up,
            "down" | "j" => Self::Down,
            "top" | "g" => Self::Top,
            "bottom" | "G" => Self::Bottom,
            "refresh" | "r" => Self::Refresh,
            "ack" | "a" => Self::Ack,
            "quit" | "q" => Self::Quit,
            "expand" | "e" => match parts.next() {
                Some(id) => Self::Expand(id.to_string()),
                None => bail!("expand needs an activity id"),
            },
            other => bail!("unknown command {other:?}"),
        };
        Ok(Some(command))
    }
}

pub async fn run(config: &DaylogConfig, height: usize) -> Result<()> {
    let db = Arc::new(store::open_db(config)?);
    let zone = db.zone();
    let journal_path = config.store.resolved_journal_path()?;

    let mut timeline = mount_timeline(Arc::new(LocalDbReader::new(db)), config);
    let _feed = push_feed::start(&journal_path, timeline.handle.clone())?;
    let mut snapshots = timeline.handle.subscribe();
    let mut viewport = HeadlessViewport::new(height);

    // render the first page before taking commands
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        if !snapshot.loading_initial && snapshot.mounted {
            viewport.sync(&snapshot);
            timeline.viewport.update(viewport.geometry());
            print!("{}", render(&snapshot, &viewport, &zone));
            break;
        }
        snapshots
            .changed()
            .await
            .context("timeline stopped before the first page loaded")?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                viewport.sync(&snapshot);
                timeline.viewport.update(viewport.geometry());
                print!("{}", render(&snapshot, &viewport, &zone));
            }
            Some(notice) = timeline.notices.recv() => {
                eprintln!("! {notice}");
            }
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                let command = match WatchCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        eprintln!("! {e}");
                        continue;
                    }
                };
                if !apply(command, &mut viewport, &timeline.handle) {
                    break;
                }
                timeline.viewport.update(viewport.geometry());
                let snapshot = snapshots.borrow().clone();
                print!("{}", render(&snapshot, &viewport, &zone));
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    timeline.shutdown().await;
    Ok(())
}

/// Returns false on quit.
fn apply(
    command: WatchCommand,
    viewport: &mut HeadlessViewport,
    handle: &daylog_timeline::TimelineHandle,
) -> bool {
    match command {
        WatchCommand::Up => viewport.page_up(),
        WatchCommand::Down => viewport.page_down(),
        WatchCommand::Top => viewport.to_top(),
        WatchCommand::Bottom => viewport.to_bottom(),
        WatchCommand::Refresh => {
            handle.refresh();
            viewport.to_top();
        }
        WatchCommand::Expand(id) => {
            handle.expand(id);
        }
        WatchCommand::Ack => {
            handle.acknowledge_fresh();
        }
        WatchCommand::Quit => return false,
    }
    true
}

pub fn render(snapshot: &TimelineSnapshot, viewport: &HeadlessViewport, zone: &CalendarZone) -> String {
    let mut out = String::new();
    for row in viewport.visible() {
        match row {
            Row::Day(date) => {
                if let Some(bucket) = snapshot.buckets.iter().find(|b| b.date == *date) {
                    let _ = writeln!(out, "{}", day_header(bucket));
                }
            }
            Row::Activity(id) => {
                if let Some(activity) = snapshot.find(id) {
                    let _ = writeln!(out, "{}", activity_line(activity, zone));
                    if let Some(events) = &activity.event_summaries {
                        for event in events {
                            let _ = writeln!(out, "        · {} {}", event.kind, event.summary);
                        }
                    }
                }
            }
        }
    }
    let _ = writeln!(out, "{}", status_line(snapshot, viewport));
    out
}

fn status_line(snapshot: &TimelineSnapshot, viewport: &HeadlessViewport) -> String {
    let top = if snapshot.loading_top {
        "loading"
    } else if snapshot.has_more_top {
        "more"
    } else {
        "live"
    };
    let bottom = if snapshot.loading_bottom {
        "loading"
    } else if snapshot.has_more_bottom {
        "more"
    } else {
        "end"
    };
    let first = viewport.scroll();
    let last = first + viewport.visible().len();
    format!(
        "[v{} | top: {top} | bottom: {bottom} | rows {first}-{last}/{} | {} activities]",
        snapshot.watermark_version,
        viewport.row_count(),
        snapshot.activity_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use daylog_core::testing::{filled_bucket, utc_zone};

    #[test]
    fn parse_accepts_words_and_shortcuts() {
        assert_eq!(WatchCommand::parse("down").unwrap(), Some(WatchCommand::Down));
        assert_eq!(WatchCommand::parse(" G ").unwrap(), Some(WatchCommand::Bottom));
        assert_eq!(
            WatchCommand::parse("expand abc").unwrap(),
            Some(WatchCommand::Expand("abc".to_string()))
        );
        assert_eq!(WatchCommand::parse("   ").unwrap(), None);
        assert!(WatchCommand::parse("expand").is_err());
        assert!(WatchCommand::parse("fly").is_err());
    }

    #[test]
    fn render_shows_visible_rows_and_status() {
        let snapshot = TimelineSnapshot {
            buckets: vec![filled_bucket("2024-06-02", 2, 3), filled_bucket("2024-06-01", 2, 1)],
            has_more_bottom: true,
            watermark_version: 4,
            mounted: true,
            ..TimelineSnapshot::default()
        };
        let mut viewport = HeadlessViewport::new(3);
        viewport.sync(&snapshot);

        let text = render(&snapshot, &viewport, &utc_zone());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("── 2024-06-02"));
        assert_eq!(
            lines[3],
            "[v4 | top: live | bottom: more | rows 0-3/6 | 4 activities]"
        );
    }
}
