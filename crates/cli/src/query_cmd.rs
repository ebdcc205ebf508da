use anyhow::{bail, Result};
use chrono::NaiveDate;
use daylog_runtime_config::DaylogConfig;

use crate::output::{self, OutputFormat};
use crate::store;

pub fn run_page(
    config: &DaylogConfig,
    offset: usize,
    limit: Option<usize>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    format: OutputFormat,
) -> Result<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            bail!("--from {from} is after --to {to}");
        }
    }
    let db = store::open_db(config)?;
    let limit = limit.unwrap_or(config.timeline.page_limit);
    let buckets = db.fetch_page(offset, limit, from, to)?;
    match format {
        OutputFormat::Json => output::print_json(&buckets),
        OutputFormat::Text => {
            if buckets.is_empty() {
                println!("(no activities)");
            } else {
                print!("{}", output::render_buckets(&buckets, &db.zone()));
            }
            Ok(())
        }
    }
}

pub fn run_since(
    config: &DaylogConfig,
    version: u64,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let db = store::open_db(config)?;
    let limit = limit.unwrap_or(config.timeline.increment_limit);
    let activities = db.fetch_increment(version, limit)?;
    match format {
        OutputFormat::Json => output::print_json(&activities),
        OutputFormat::Text => {
            print!("{}", output::render_activities(&activities, &db.zone()));
            Ok(())
        }
    }
}

pub fn run_show(config: &DaylogConfig, id: &str, format: OutputFormat) -> Result<()> {
    let db = store::open_db(config)?;
    let Some(activity) = db.fetch_detail(id)? else {
        bail!("no activity with id {id}");
    };
    match format {
        OutputFormat::Json => output::print_json(&activity),
        OutputFormat::Text => {
            print!("{}", output::render_detail(&activity, &db.zone()));
            Ok(())
        }
    }
}
