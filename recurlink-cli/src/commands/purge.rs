//! `recurlink purge --yes`

use anyhow::{bail, Context, Result};
use clap::Args;

use super::{home_dir, open_engine};

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Confirm dropping every correspondence.
    #[arg(long)]
    pub yes: bool,
}

impl PurgeArgs {
    pub fn run(self) -> Result<()> {
        if !self.yes {
            bail!("purge drops every correspondence; pass --yes to confirm");
        }
        let home = home_dir()?;
        let mut engine = open_engine(&home, false)?;
        let removed = engine.purge_all().context("failed to purge correspondences")?;
        println!("✓ Purged {removed} correspondence rows");
        Ok(())
    }
}
