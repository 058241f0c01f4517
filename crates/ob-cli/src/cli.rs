//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Presence-driven play-session tracker.
///
/// Replays presence events for community members, derives play sessions
/// from them and reports where the time went.
#[derive(Debug, Parser)]
#[command(name = "oblivionis", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record play sessions from a JSONL stream of presence events.
    Ingest {
        /// File to read events from. Reads stdin when omitted or `-`.
        file: Option<PathBuf>,

        /// Number of worker partitions (overrides config).
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show playtime per game for a period.
    Report {
        /// Current week, Monday to Sunday (default).
        #[arg(long, group = "period")]
        week: bool,

        /// Previous week.
        #[arg(long, group = "period")]
        last_week: bool,

        /// Today.
        #[arg(long, group = "period")]
        day: bool,

        /// Yesterday.
        #[arg(long, group = "period")]
        last_day: bool,

        /// Only count sessions for this member ID.
        #[arg(long)]
        member: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show database location and recorded totals.
    Status,
}
