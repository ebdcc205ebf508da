use anyhow::{Context, Result};
use daylog_runtime_config::DaylogConfig;

/// Print the effective configuration, defaults and fallbacks applied.
pub fn run(config: &DaylogConfig) -> Result<()> {
    let body = toml::to_string_pretty(config).context("serialize config")?;
    print!("{body}");
    if let Ok(db) = config.store.resolved_db_path() {
        println!("# db: {}", db.display());
    }
    if let Ok(journal) = config.store.resolved_journal_path() {
        println!("# journal: {}", journal.display());
    }
    Ok(())
}
