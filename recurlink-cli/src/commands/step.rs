//! `recurlink step [--batch N] [--reset]`

use anyhow::{Context, Result};
use clap::Args;

use recurlink_core::settings;
use recurlink_sync::{
    step_sequences,
    stepped::{self, SEQUENCES_JOB},
};

use super::{home_dir, open_engine};

/// Reconcile the next batch of sequences and remember where to resume.
#[derive(Args, Debug)]
pub struct StepArgs {
    /// Sequences per step; defaults to the `step_batch_size` setting.
    #[arg(long, value_name = "N")]
    pub batch: Option<usize>,

    /// Forget the stored offset so the next step starts from the beginning.
    #[arg(long)]
    pub reset: bool,
}

impl StepArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        if self.reset {
            match stepped::reset_at(&home, SEQUENCES_JOB).context("failed to reset offset")? {
                Some(offset) => println!("✓ Offset {offset} cleared"),
                None => println!("· No stepped sync in progress"),
            }
            return Ok(());
        }

        let batch = match self.batch {
            Some(n) => n,
            None => {
                settings::load_at(&home)
                    .context("failed to load settings.yaml")?
                    .step_batch_size
            }
        };
        let mut engine = open_engine(&home, false)?;
        let report =
            step_sequences(&home, &mut engine, batch).context("stepped sync failed")?;

        if report.finished {
            println!("✓ Stepped sync finished ({} sequences)", report.from);
        } else {
            println!(
                "→ Synced sequences {}..{} ({} failed); run again to continue",
                report.from, report.to, report.failed
            );
        }
        Ok(())
    }
}
