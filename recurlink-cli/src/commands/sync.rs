//! `recurlink sync`: reconcile sequences against the record ledger.

use anyhow::{Context, Result};
use clap::Args;

use recurlink_core::types::SequenceId;
use recurlink_sync::pipeline::{self, SyncScope};

use super::{home_dir, open_engine, print_outcome};

/// Arguments for `recurlink sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sequence to sync (omit when using `--all`).
    pub sequence: Option<u64>,

    /// Sync every catalogued sequence.
    #[arg(long, conflicts_with = "sequence")]
    pub all: bool,

    /// Hard-delete unmatched records for this run.
    #[arg(long)]
    pub delete_unused: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let mut engine = open_engine(&home, self.delete_unused)?;

        if self.all {
            let outcomes =
                pipeline::run(&mut engine, SyncScope::All).context("sync --all failed")?;
            if outcomes.is_empty() {
                println!("No sequences catalogued. Run `recurlink sequence add` first.");
            }
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        } else {
            let id = self
                .sequence
                .map(SequenceId)
                .context("provide a sequence id or use --all")?;
            let outcomes = pipeline::run(&mut engine, SyncScope::Sequence(id))
                .with_context(|| format!("sync failed for sequence {id}"))?;
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        }
        Ok(())
    }
}
