use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ob_cli::commands::{ingest, report, status};
use ob_cli::{Cli, Commands, Config};
use ob_core::MemberId;

/// Open the configured database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<ob_db::Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    ob_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so report output stays machine-readable.
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Commands::Ingest { file, workers }) => {
            let db = open_database(&config)?;
            let workers = workers.unwrap_or_else(|| config.workers());
            ingest::run(
                &mut io::stdout(),
                db,
                file.as_deref(),
                workers,
                config.tracker.clone(),
            )?;
        }
        Some(Commands::Report {
            week: _,
            last_week,
            day,
            last_day,
            member,
            json,
        }) => {
            let db = open_database(&config)?;
            let period = if last_week {
                report::Period::LastWeek
            } else if day {
                report::Period::Day
            } else if last_day {
                report::Period::LastDay
            } else {
                report::Period::Week
            };
            let member = member
                .map(MemberId::new)
                .transpose()
                .context("invalid --member")?;
            report::run(&db, period, member.as_ref(), json)?;
        }
        Some(Commands::Status) => {
            let db = open_database(&config)?;
            status::run(&mut io::stdout(), &db, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
