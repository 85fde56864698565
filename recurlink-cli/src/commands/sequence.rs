//! `recurlink sequence add|list|reschedule|remove`
//!
//! Saving a sequence fires the same "sequence saved" callback a host system
//! would, so the ledger follows unless `--no-sync` is given.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use recurlink_core::{
    catalog,
    types::{RegistrationSettings, SequenceId, SharedFields},
};

use super::super::DateRangeArg;
use super::{home_dir, open_engine, print_outcome};

#[derive(Subcommand, Debug)]
pub enum SequenceCommand {
    /// Add a sequence to the catalog.
    Add(AddArgs),

    /// List catalogued sequences.
    List,

    /// Replace every occurrence of a sequence (a rule edit).
    Reschedule(RescheduleArgs),

    /// Delete a sequence. Its records stay in the ledger.
    Remove {
        /// Sequence id.
        id: u64,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub title: String,

    /// Occurrence as START[/END]; repeat for each occurrence.
    #[arg(long = "at", value_name = "START[/END]", required = true)]
    pub at: Vec<DateRangeArg>,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long)]
    pub summary: Option<String>,

    #[arg(long, value_name = "ID")]
    pub event_type: Option<u64>,

    #[arg(long, value_name = "ID")]
    pub location: Option<u64>,

    /// Hide the records from public listings.
    #[arg(long)]
    pub private: bool,

    /// Turn on online registration for every occurrence.
    #[arg(long)]
    pub registration: bool,

    /// Only write the catalog.
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args, Debug)]
pub struct RescheduleArgs {
    pub id: u64,

    /// New occurrence as START[/END]; repeat for each occurrence.
    #[arg(long = "at", value_name = "START[/END]", required = true)]
    pub at: Vec<DateRangeArg>,

    /// Only write the catalog.
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Tabled)]
struct SequenceRow {
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "occurrences")]
    occurrences: usize,
    #[tabled(rename = "first")]
    first: String,
    #[tabled(rename = "last")]
    last: String,
}

pub fn run(cmd: SequenceCommand) -> Result<()> {
    match cmd {
        SequenceCommand::Add(args) => add(args),
        SequenceCommand::List => list(),
        SequenceCommand::Reschedule(args) => reschedule(args),
        SequenceCommand::Remove { id } => remove(SequenceId(id)),
    }
}

fn add(args: AddArgs) -> Result<()> {
    let home = home_dir()?;
    let fields = SharedFields {
        title: args.title,
        description: args.description,
        summary: args.summary,
        location_id: args.location,
        event_type: args.event_type,
        is_public: !args.private,
        registration: RegistrationSettings {
            enabled: args.registration,
            ..RegistrationSettings::default()
        },
    };
    let dates = args.at.into_iter().map(Into::into).collect();
    let sequence =
        catalog::add_sequence_at(&home, fields, dates).context("failed to add sequence")?;
    println!(
        "✓ Added sequence {} '{}' ({} occurrences)",
        sequence.id,
        sequence.fields.title,
        sequence.occurrences.len()
    );
    if !args.no_sync {
        saved(&home, sequence.id)?;
    }
    Ok(())
}

fn list() -> Result<()> {
    let home = home_dir()?;
    let sequences = catalog::list_sequences_at(&home).context("failed to read catalog")?;
    if sequences.is_empty() {
        println!("No sequences catalogued.");
        println!("Run: recurlink sequence add <title> --at <START>");
        return Ok(());
    }

    let rows: Vec<SequenceRow> = sequences
        .iter()
        .map(|s| {
            let dates = s.sorted_dates();
            let fmt = |i: Option<&recurlink_core::OccurrenceDate>| {
                i.map_or_else(|| "-".to_string(), |d| d.start.format("%Y-%m-%d %H:%M").to_string())
            };
            SequenceRow {
                id: s.id.0,
                title: s.fields.title.clone(),
                occurrences: dates.len(),
                first: fmt(dates.first()),
                last: fmt(dates.last()),
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn reschedule(args: RescheduleArgs) -> Result<()> {
    let home = home_dir()?;
    let id = SequenceId(args.id);
    let dates = args.at.into_iter().map(Into::into).collect();
    let sequence = catalog::reschedule_at(&home, id, dates)
        .with_context(|| format!("failed to reschedule sequence {id}"))?;
    println!(
        "✓ Rescheduled sequence {id} ({} occurrences)",
        sequence.occurrences.len()
    );
    if !args.no_sync {
        saved(&home, id)?;
    }
    Ok(())
}

fn remove(id: SequenceId) -> Result<()> {
    let home = home_dir()?;
    let existed = catalog::delete_sequence_at(&home, id)
        .with_context(|| format!("failed to delete sequence {id}"))?;
    let mut engine = open_engine(&home, false)?;
    let rows = engine
        .on_sequence_deleted(id)
        .context("failed to clear correspondences")?;
    if existed {
        println!("✓ Removed sequence {id} ({rows} correspondence rows dropped)");
    } else {
        println!("· Sequence {id} was not catalogued ({rows} correspondence rows dropped)");
    }
    Ok(())
}

fn saved(home: &std::path::Path, id: SequenceId) -> Result<()> {
    let mut engine = open_engine(home, false)?;
    if let Some(outcome) = engine
        .on_sequence_saved(id)
        .with_context(|| format!("sync failed for sequence {id}"))?
    {
        print_outcome(&outcome);
    }
    Ok(())
}
