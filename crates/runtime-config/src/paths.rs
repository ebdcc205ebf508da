//! Default on-disk locations.
//!
//! `~/.config/daylog/` holds the config, `~/.local/share/daylog/` holds the
//! log database and the push journal.

use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::PathBuf;

use crate::CONFIG_FILE_NAME;

pub const DB_FILE_NAME: &str = "log.db";
pub const JOURNAL_FILE_NAME: &str = "push.jsonl";

fn home_dir() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .context("Could not determine home directory")
}

/// `~/.config/daylog`
pub fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config").join("daylog"))
}

/// `~/.local/share/daylog`
pub fn data_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".local").join("share").join("daylog"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(DB_FILE_NAME))
}

pub fn default_journal_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(JOURNAL_FILE_NAME))
}
