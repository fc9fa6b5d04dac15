//! Stampede broker: pushes generated messages to connected subscribers,
//! retries them, and archives the ones nobody acknowledges.

mod app;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stampede_core::{init_logging, Config, Paths};

/// Stampede broker command-line interface.
#[derive(Parser)]
#[command(name = "stampede-broker")]
#[command(about = "Message broker with at-most-one dispatch and fallback archiving")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs and the fallback store. Defaults to ~/.stampede
    #[arg(long, env = "STAMPEDE_BASE_DIR", global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker (default)
    Serve(ServeArgs),
    /// Inspect messages written to the fallback store
    Archive {
        #[command(subcommand)]
        command: ArchiveCommand,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(long)]
    listen: Option<String>,

    /// Milliseconds between generated messages
    #[arg(long)]
    produce_interval_ms: Option<u64>,

    /// Also archive messages that were never dispatched
    #[arg(long)]
    archive_undispatched: bool,
}

#[derive(Subcommand)]
enum ArchiveCommand {
    /// List archived message ids
    List,
    /// Show one archived message
    Get {
        /// Message id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;

    let log_level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    let log_file = config.log_to_file.then(|| paths.log_file());

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            init_logging("stampede-broker", &log_level, log_file);

            if let Some(listen) = args.listen {
                config.broker.listen_addr = listen;
            }
            if let Some(interval) = args.produce_interval_ms {
                config.broker.produce_interval_ms = interval;
            }
            if args.archive_undispatched {
                config.broker.archive_undispatched = true;
            }

            app::run_broker(config, paths).await?;
        }
        Commands::Archive { command } => {
            init_logging("stampede-broker", &log_level, None);

            match command {
                ArchiveCommand::List => app::list_archive(&paths).await?,
                ArchiveCommand::Get { id } => app::show_archived(&paths, &id).await?,
            }
        }
    }

    Ok(())
}
