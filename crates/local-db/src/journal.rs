use anyhow::{Context, Result};
use daylog_core::PushNotification;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only JSON-lines file the recorder writes one push notification to
/// per persisted activity. Viewers tail it to learn about new data.
#[derive(Debug, Clone)]
pub struct PushJournal {
    path: PathBuf,
}

impl PushJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, notification: &PushNotification) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir for {}", self.path.display()))?;
        }
        let line = notification.to_line()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open journal {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Cannot append to {}", self.path.display()))?;
        Ok(())
    }
}

/// Tracks a byte offset into the journal for incremental reads.
pub struct JournalTailer {
    path: PathBuf,
    offset: u64,
}

impl JournalTailer {
    /// Start at the beginning; every existing line will be returned.
    pub fn from_start(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    /// Start at the current end so only lines written from now on are returned.
    pub fn from_end(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, offset }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the last read.
    ///
    /// A trailing line without a newline is left for the next call. A file
    /// shorter than the stored offset is treated as replaced and re-read from
    /// the start.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let file_size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot stat {}", self.path.display()));
            }
        };

        if file_size < self.offset {
            tracing::info!(
                "Journal truncated ({}B < {}B offset), resetting: {}",
                file_size,
                self.offset,
                self.path.display()
            );
            self.offset = 0;
        }

        if file_size == self.offset {
            return Ok(Vec::new());
        }

        let mut file = std::fs::File::open(&self.path)
            .with_context(|| format!("Cannot open {}", self.path.display()))?;
        file.seek(SeekFrom::Start(self.offset))
            .with_context(|| format!("Cannot seek in {}", self.path.display()))?;

        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("Cannot read {}", self.path.display()))?;
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            self.offset += read as u64;
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_notifications_are_tailed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let journal = PushJournal::new(dir.path().join("data").join("push.jsonl"));
        let mut tailer = JournalTailer::from_start(journal.path());

        assert!(tailer.read_new_lines().unwrap().is_empty());

        journal
            .append(&PushNotification::activity_persisted("a", 1))
            .unwrap();
        journal
            .append(&PushNotification::activity_persisted("b", 2))
            .unwrap();

        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(PushNotification::parse(&lines[1]).unwrap().version(), 2);
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn from_end_skips_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = PushJournal::new(dir.path().join("push.jsonl"));
        journal
            .append(&PushNotification::activity_persisted("old", 1))
            .unwrap();

        let mut tailer = JournalTailer::from_end(journal.path());
        journal
            .append(&PushNotification::activity_persisted("new", 2))
            .unwrap();

        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"new\""));
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.jsonl");
        std::fs::write(&path, "{\"kind\":\"activity_persisted\"").unwrap();

        let mut tailer = JournalTailer::from_start(&path);
        assert!(tailer.read_new_lines().unwrap().is_empty());
        assert_eq!(tailer.offset(), 0);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, ",\"activity_id\":\"a\",\"version\":1}}").unwrap();
        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(PushNotification::parse(&lines[0]).is_ok());
    }

    #[test]
    fn truncated_journal_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.jsonl");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let mut tailer = JournalTailer::from_start(&path);
        assert_eq!(tailer.read_new_lines().unwrap().len(), 2);

        std::fs::write(&path, "fresh\n").unwrap();
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["fresh"]);
    }
}
