//! `recurlink break <sequence> <occurrence>`

use anyhow::{Context, Result};
use clap::Args;

use recurlink_core::types::{OccurrenceId, SequenceId};

use super::{home_dir, open_engine};

/// Detach one occurrence into a standalone sequence, keeping its record.
#[derive(Args, Debug)]
pub struct BreakArgs {
    pub sequence: u64,
    pub occurrence: u64,
}

impl BreakArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let sequence = SequenceId(self.sequence);
        let occurrence = OccurrenceId(self.occurrence);
        let mut engine = open_engine(&home, false)?;
        let record = engine.store().forward(sequence).get(&occurrence).copied();

        let new_sequence = engine
            .break_occurrence(sequence, occurrence)
            .with_context(|| format!("failed to break occurrence {occurrence} out of {sequence}"))?;

        println!("✓ Occurrence {occurrence} is now sequence {new_sequence}");
        if let Some(record) = record {
            println!("  record {record} moved along");
        }
        Ok(())
    }
}
