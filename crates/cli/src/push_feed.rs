//! Follow the push journal and forward notifications to a mounted timeline.

use anyhow::{Context, Result};
use daylog_local_db::JournalTailer;
use daylog_timeline::TimelineHandle;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fallback poll in case the platform watcher misses a write.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Running feed. Dropping it stops the watcher and the follow task.
pub struct PushFeed {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for PushFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start following `journal_path` from its current end.
pub fn start(journal_path: &Path, handle: TimelineHandle) -> Result<PushFeed> {
    let dir = journal_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

    let (wake_tx, wake_rx) = mpsc::unbounded_channel();
    let file_name = journal_path.file_name().map(|n| n.to_os_string());
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) && event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant {
                    let _ = wake_tx.send(());
                }
            }
            Err(e) => {
                error!("Journal watcher error: {}", e);
            }
        }
    })
    .context("Failed to create journal watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;
    info!("Following push journal: {}", journal_path.display());

    let tailer = JournalTailer::from_end(journal_path);
    let task = tokio::spawn(follow(tailer, wake_rx, handle));
    Ok(PushFeed {
        _watcher: watcher,
        task,
    })
}

async fn follow(
    mut tailer: JournalTailer,
    mut wake: mpsc::UnboundedReceiver<()>,
    handle: TimelineHandle,
) {
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            woke = wake.recv() => {
                if woke.is_none() {
                    break;
                }
            }
            _ = poll.tick() => {}
        }
        if handle.is_closed() {
            break;
        }
        drain(&mut tailer, &handle);
    }
    debug!("push feed stopped");
}

/// Forward every complete journal line. Malformed lines are logged and
/// skipped. Returns how many notifications were forwarded.
pub fn drain(tailer: &mut JournalTailer, handle: &TimelineHandle) -> usize {
    let lines = match tailer.read_new_lines() {
        Ok(lines) => lines,
        Err(e) => {
            warn!("Failed to read push journal: {e:#}");
            return 0;
        }
    };
    lines
        .iter()
        .filter(|line| handle.push_raw(line).is_ok())
        .count()
}
