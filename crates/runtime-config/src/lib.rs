//! Shared runtime configuration types.
//!
//! The CLI and the timeline engine both read `daylog.toml` through these
//! types. Every field carries a serde default so a partial (or missing) file
//! still yields a complete configuration.

pub mod paths;

use anyhow::{Context, Result};
use daylog_core::CalendarZone;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "daylog.toml";

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "DAYLOG_CONFIG";

/// Top-level configuration (persisted as `daylog.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaylogConfig {
    #[serde(default)]
    pub timeline: TimelineSettings,
    #[serde(default)]
    pub viewport: ViewportSettings,
    #[serde(default)]
    pub calendar: CalendarSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSettings {
    /// Maximum number of day buckets held in memory.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Activity rows requested per pagination fetch.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Activity rows requested per incremental fetch.
    #[serde(default = "default_increment_limit")]
    pub increment_limit: usize,
    #[serde(default = "default_debounce_ms")]
    pub top_debounce_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub bottom_debounce_ms: u64,
    /// Minimum spacing between two reports of the same edge.
    #[serde(default = "default_debounce_ms")]
    pub edge_debounce_ms: u64,
    /// Delay before re-checking a marker after a merge lands.
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,
    #[serde(default = "default_max_rechecks")]
    pub max_rechecks: u32,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            page_limit: default_page_limit(),
            increment_limit: default_increment_limit(),
            top_debounce_ms: default_debounce_ms(),
            bottom_debounce_ms: default_debounce_ms(),
            edge_debounce_ms: default_debounce_ms(),
            recheck_delay_ms: default_recheck_delay_ms(),
            max_rechecks: default_max_rechecks(),
        }
    }
}

impl TimelineSettings {
    pub fn top_debounce(&self) -> Duration {
        Duration::from_millis(self.top_debounce_ms)
    }

    pub fn bottom_debounce(&self) -> Duration {
        Duration::from_millis(self.bottom_debounce_ms)
    }

    pub fn edge_debounce(&self) -> Duration {
        Duration::from_millis(self.edge_debounce_ms)
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}

/// Retry policy while waiting for the scroll container and markers to mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportSettings {
    #[serde(default = "default_mount_retry_initial_ms")]
    pub mount_retry_initial_ms: u64,
    #[serde(default = "default_mount_retry_max_ms")]
    pub mount_retry_max_ms: u64,
    /// Attempts after which a still-unmounted viewport is logged as a warning.
    #[serde(default = "default_mount_retry_warn_after")]
    pub mount_retry_warn_after: u32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            mount_retry_initial_ms: default_mount_retry_initial_ms(),
            mount_retry_max_ms: default_mount_retry_max_ms(),
            mount_retry_warn_after: default_mount_retry_warn_after(),
        }
    }
}

impl ViewportSettings {
    pub fn mount_retry_initial(&self) -> Duration {
        Duration::from_millis(self.mount_retry_initial_ms)
    }

    pub fn mount_retry_max(&self) -> Duration {
        Duration::from_millis(self.mount_retry_max_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSettings {
    /// `"local"`, `"utc"` or a fixed offset such as `"+09:00"`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

impl CalendarSettings {
    /// Resolved zone; an unparsable value falls back to local time.
    pub fn zone(&self) -> CalendarZone {
        self.timezone.parse().unwrap_or_else(|e| {
            warn!("{e}; using local time");
            CalendarZone::Local
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => paths::default_db_path(),
        }
    }

    pub fn resolved_journal_path(&self) -> Result<PathBuf> {
        match &self.journal_path {
            Some(path) => Ok(path.clone()),
            None => paths::default_journal_path(),
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_capacity() -> usize {
    100
}
fn default_page_limit() -> usize {
    50
}
fn default_increment_limit() -> usize {
    15
}
fn default_debounce_ms() -> u64 {
    200
}
fn default_recheck_delay_ms() -> u64 {
    250
}
fn default_max_rechecks() -> u32 {
    8
}
fn default_mount_retry_initial_ms() -> u64 {
    50
}
fn default_mount_retry_max_ms() -> u64 {
    1_000
}
fn default_mount_retry_warn_after() -> u32 {
    20
}
fn default_timezone() -> String {
    "local".to_string()
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut DaylogConfig) -> bool {
    let mut changed = false;
    let timeline = &mut config.timeline;

    if timeline.capacity == 0 {
        timeline.capacity = default_capacity();
        changed = true;
    }
    if timeline.page_limit == 0 {
        timeline.page_limit = default_page_limit();
        changed = true;
    }
    if timeline.increment_limit == 0 {
        timeline.increment_limit = default_increment_limit();
        changed = true;
    }
    // a recheck that fires before the fetch debounce elapses would be dropped
    let min_recheck = timeline.top_debounce_ms.max(timeline.bottom_debounce_ms);
    if timeline.recheck_delay_ms < min_recheck {
        timeline.recheck_delay_ms = min_recheck;
        changed = true;
    }

    let viewport = &mut config.viewport;
    if viewport.mount_retry_initial_ms == 0 {
        viewport.mount_retry_initial_ms = default_mount_retry_initial_ms();
        changed = true;
    }
    if viewport.mount_retry_max_ms < viewport.mount_retry_initial_ms {
        viewport.mount_retry_max_ms = viewport.mount_retry_initial_ms;
        changed = true;
    }

    if config.calendar.timezone.parse::<CalendarZone>().is_err() {
        config.calendar.timezone = default_timezone();
        changed = true;
    }

    changed
}

/// Resolve which config file to read: explicit path, then `DAYLOG_CONFIG`,
/// then `~/.config/daylog/daylog.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(from_env) = std::env::var(CONFIG_ENV_VAR) {
        if !from_env.trim().is_empty() {
            return Ok(PathBuf::from(from_env));
        }
    }
    paths::default_config_path()
}

/// Load configuration from disk. A missing file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<DaylogConfig> {
    let path = resolve_config_path(explicit)?;
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(DaylogConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<DaylogConfig> {
    let mut config: DaylogConfig = toml::from_str(content)?;
    if apply_compat_fallbacks(&mut config) {
        debug!("Config normalized by compatibility fallbacks");
    }
    Ok(config)
}
