use anyhow::Result;
use daylog_local_db::{LocalDb, PushJournal};
use daylog_runtime_config::DaylogConfig;

/// Open the activity log named by the config, in the configured zone.
pub fn open_db(config: &DaylogConfig) -> Result<LocalDb> {
    let path = config.store.resolved_db_path()?;
    let db = LocalDb::open_path(&path)?;
    Ok(db.with_zone(config.calendar.zone()))
}

pub fn journal(config: &DaylogConfig) -> Result<PushJournal> {
    Ok(PushJournal::new(config.store.resolved_journal_path()?))
}
