//! `recurlink init [--delete-unused] [--batch-size N] [--default-event-type ID]`

use anyhow::{Context, Result};
use clap::Args;

use recurlink_core::settings;

/// Write global settings. Values not given keep their current setting.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Hard-delete records that no longer match an occurrence.
    #[arg(long, conflicts_with = "keep_unused")]
    pub delete_unused: bool,

    /// Disable and orphan unmatched records (the default).
    #[arg(long)]
    pub keep_unused: bool,

    /// Sequences reconciled per `recurlink step`.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Event type for sequences without a valid one.
    #[arg(long, value_name = "ID")]
    pub default_event_type: Option<u64>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let mut current = settings::load_at(&home).context("failed to load settings.yaml")?;

        if self.delete_unused {
            current.delete_unused = true;
        }
        if self.keep_unused {
            current.delete_unused = false;
        }
        if let Some(n) = self.batch_size {
            current.step_batch_size = n.max(1);
        }
        if self.default_event_type.is_some() {
            current.default_event_type = self.default_event_type;
        }

        settings::save_at(&home, &current).context("failed to write settings.yaml")?;
        println!("✓ Saved {}", settings::settings_path_at(&home).display());
        println!("  delete unused:      {}", current.delete_unused);
        println!("  step batch size:    {}", current.step_batch_size);
        match current.default_event_type {
            Some(id) => println!("  default event type: {id}"),
            None => println!("  default event type: (none)"),
        }
        Ok(())
    }
}
