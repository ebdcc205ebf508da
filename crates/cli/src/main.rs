mod config_cmd;
mod output;
mod push_feed;
mod query_cmd;
mod record_cmd;
mod store;
mod viewport;
mod watch_cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "daylog", about = "daylog - on-device activity log and live timeline")]
struct Cli {
    /// Config file (defaults to $DAYLOG_CONFIG, then ~/.config/daylog/daylog.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist an activity and notify live viewers
    Record(record_cmd::RecordArgs),

    /// Print one page of the timeline, grouped by day
    Page {
        /// Activity rows to skip from the newest
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Activity rows to return (defaults to timeline.page_limit)
        #[arg(long)]
        limit: Option<usize>,
        /// Earliest local date (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<chrono::NaiveDate>,
        /// Latest local date (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<chrono::NaiveDate>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print activities persisted after a version
    Since {
        version: u64,
        /// Maximum rows (defaults to timeline.increment_limit)
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print one activity with its event summaries
    Show {
        id: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Live timeline driven by stdin scroll commands
    Watch {
        /// Visible rows
        #[arg(long, default_value_t = 20)]
        height: usize,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match daylog_runtime_config::load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Record(args) => record_cmd::run(&config, args),
            Commands::Page {
                offset,
                limit,
                from,
                to,
                format,
            } => query_cmd::run_page(&config, offset, limit, from, to, format),
            Commands::Since {
                version,
                limit,
                format,
            } => query_cmd::run_since(&config, version, limit, format),
            Commands::Show { id, format } => query_cmd::run_show(&config, &id, format),
            Commands::Watch { height } => watch_cmd::run(&config, height).await,
            Commands::Config => config_cmd::run(&config),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
