//! recurlink: keep recurring sequences and CRM event records in step.
//!
//! # Usage
//!
//! ```text
//! recurlink init [--delete-unused] [--batch-size N] [--default-event-type ID]
//! recurlink sequence add <title> --at START[/END]... [--no-sync]
//! recurlink sequence list
//! recurlink sequence reschedule <id> --at START[/END]... [--no-sync]
//! recurlink sequence remove <id>
//! recurlink occurrence delete|hide <sequence> <occurrence>
//! recurlink sync <sequence> | --all [--delete-unused]
//! recurlink step [--batch N] [--reset]
//! recurlink status [--json]
//! recurlink break <sequence> <occurrence>
//! recurlink record show|edit|offline|online
//! recurlink purge --yes
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use clap::{Parser, Subcommand};

use commands::{
    init::InitArgs, occurrence::OccurrenceCommand, purge::PurgeArgs, record::RecordCommand,
    sequence::SequenceCommand, split::BreakArgs, status::StatusArgs, step::StepArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "recurlink",
    version,
    about = "Sync recurring event sequences with CRM event records",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.recurlink/settings.yaml.
    Init(InitArgs),

    /// Manage sequences in the local catalog.
    Sequence {
        #[command(subcommand)]
        command: SequenceCommand,
    },

    /// Remove a single occurrence from a sequence.
    Occurrence {
        #[command(subcommand)]
        command: OccurrenceCommand,
    },

    /// Reconcile one sequence, or all of them, against the record ledger.
    Sync(SyncArgs),

    /// Run one batch of the stepped bulk sync.
    Step(StepArgs),

    /// Show correspondence state per sequence.
    Status(StatusArgs),

    /// Break one occurrence out into a standalone sequence.
    Break(BreakArgs),

    /// Inspect or edit records as the CRM would.
    Record {
        #[command(subcommand)]
        command: RecordCommand,
    },

    /// Drop every correspondence. Records and sequences are kept.
    Purge(PurgeArgs),
}

// ---------------------------------------------------------------------------
// Shared date argument
// ---------------------------------------------------------------------------

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// `START[/END]` in local wall-clock time, e.g. `2024-01-08T10:00/2024-01-08T11:30`.
/// Without an end the occurrence lasts one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangeArg {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FromStr for DateRangeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |raw: &str| {
            NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT)
                .map_err(|e| format!("invalid date '{raw}': {e}; expected YYYY-MM-DDTHH:MM"))
        };
        let (start, end) = match s.split_once('/') {
            Some((start, end)) => (parse(start)?, parse(end)?),
            None => {
                let start = parse(s)?;
                (start, start + Duration::hours(1))
            }
        };
        if end < start {
            return Err(format!("end {end} is before start {start}"));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for DateRangeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

impl From<DateRangeArg> for (NaiveDateTime, NaiveDateTime) {
    fn from(d: DateRangeArg) -> Self {
        (d.start, d.end)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sequence { command } => commands::sequence::run(command),
        Commands::Occurrence { command } => commands::occurrence::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Step(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Break(args) => args.run(),
        Commands::Record { command } => commands::record::run(command),
        Commands::Purge(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
