//! Stampede subscriber: consumes messages pushed by the broker, simulates
//! work for each one and acknowledges it.
//!
//! Exits 0 once its task limit is reached and 1 on any fatal fault.

mod app;

use std::path::PathBuf;

use clap::Parser;
use stampede_core::{init_logging, random_batch_size, Config, Paths};
use tracing::info;

/// Stampede subscriber command-line interface.
#[derive(Parser, Debug)]
#[command(name = "stampede-subscriber")]
#[command(about = "Consumes and acknowledges messages pushed by a stampede broker")]
#[command(version)]
struct Cli {
    /// Broker base URL. Overrides the config file.
    #[arg(long, env = "STAMPEDE_BROKER_URL")]
    broker_url: Option<String>,

    /// Maximum concurrent tasks. Random in [2, 10] when unset.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Exit after this many tasks finished. Defaults to the batch size.
    #[arg(long, conflicts_with = "persistent")]
    task_limit: Option<usize>,

    /// Keep consuming until a fatal fault instead of exiting after the task limit
    #[arg(long)]
    persistent: bool,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to ~/.stampede
    #[arg(long, env = "STAMPEDE_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let log_level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    let log_file = config.log_to_file.then(|| paths.log_file());
    if log_file.is_some() {
        paths.ensure_dirs()?;
    }
    init_logging("stampede-subscriber", &log_level, log_file);

    let batch_size = cli
        .batch_size
        .or(config.subscriber.batch_size)
        .unwrap_or_else(random_batch_size);
    let persistent = cli.persistent || config.subscriber.persistent;

    let settings = app::SubscriberSettings {
        broker_url: cli.broker_url.unwrap_or(config.subscriber.broker_url),
        batch_size,
        task_limit: if persistent {
            None
        } else {
            Some(cli.task_limit.unwrap_or(batch_size))
        },
    };

    info!(
        broker_url = %settings.broker_url,
        batch_size = settings.batch_size,
        task_limit = ?settings.task_limit,
        "Subscriber starting"
    );

    app::run_subscriber(settings).await
}
