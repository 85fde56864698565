//! `recurlink occurrence delete|hide <sequence> <occurrence>`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use recurlink_core::{
    catalog,
    types::{OccurrenceId, SequenceId},
};
use recurlink_sync::{ExternalRecordClient, RecordRetirement};

use super::{home_dir, open_engine, Engine};

#[derive(Subcommand, Debug)]
pub enum OccurrenceCommand {
    /// Delete an occurrence; its record is disabled (or deleted).
    Delete(DeleteArgs),

    /// Hide an occurrence; its record is disabled and kept as an orphan.
    Hide(TargetArgs),
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    pub sequence: u64,
    pub occurrence: u64,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Hard-delete the record instead of disabling it.
    #[arg(long)]
    pub delete_unused: bool,
}

pub fn run(cmd: OccurrenceCommand) -> Result<()> {
    let home = home_dir()?;
    match cmd {
        OccurrenceCommand::Delete(args) => {
            let mut engine = open_engine(&home, args.delete_unused)?;
            let (sequence, occurrence) = remove(&home, &engine, &args.target)?;
            let retired = engine
                .on_occurrence_deleted(sequence, occurrence)
                .context("failed to retire record")?;
            match retired {
                Some(RecordRetirement::Disabled(id)) => println!("✓ Record {id} disabled"),
                Some(RecordRetirement::Deleted(id)) => println!("✓ Record {id} deleted"),
                Some(RecordRetirement::Failed(id)) => {
                    println!("! Ledger call failed; record {id} kept as an orphan")
                }
                None => println!("· Occurrence {occurrence} had no record"),
            }
        }
        OccurrenceCommand::Hide(target) => {
            let mut engine = open_engine(&home, false)?;
            let (sequence, occurrence) = remove(&home, &engine, &target)?;
            match engine
                .on_occurrence_hidden(sequence, occurrence)
                .context("failed to orphan record")?
            {
                Some(id) => println!("✓ Record {id} disabled and kept as an orphan"),
                None => println!("· Occurrence {occurrence} had no record"),
            }
        }
    }
    Ok(())
}

/// Drop the occurrence from the catalog. Refused while the ledger is
/// offline: its record could not be retired afterwards.
fn remove(
    home: &std::path::Path,
    engine: &Engine,
    target: &TargetArgs,
) -> Result<(SequenceId, OccurrenceId)> {
    let sequence = SequenceId(target.sequence);
    let occurrence = OccurrenceId(target.occurrence);
    if !engine.client().is_available() {
        bail!("record ledger is unavailable; occurrence {occurrence} was not removed");
    }
    catalog::remove_occurrence_at(home, sequence, occurrence)
        .with_context(|| format!("failed to remove occurrence {occurrence} of sequence {sequence}"))?;
    println!("✓ Removed occurrence {occurrence} from sequence {sequence}");
    Ok((sequence, occurrence))
}
