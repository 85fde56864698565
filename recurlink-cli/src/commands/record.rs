//! `recurlink record show|edit|offline|online`: the CRM side of the link.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use recurlink_core::types::ExternalId;
use recurlink_sync::ExternalRecordClient;

use super::{home_dir, open_engine, print_outcome};

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Print a record as JSON.
    Show {
        id: u64,
    },

    /// Edit a record, then notify the engine as the CRM would.
    Edit(EditArgs),

    /// Mark the ledger unavailable; every sync is refused.
    Offline,

    /// Mark the ledger available again.
    Online,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub summary: Option<String>,

    /// Skip the "record changed" callback.
    #[arg(long)]
    pub no_notify: bool,
}

pub fn run(cmd: RecordCommand) -> Result<()> {
    let home = home_dir()?;
    let mut engine = open_engine(&home, false)?;
    match cmd {
        RecordCommand::Show { id } => {
            let Some(record) = engine.client().get(ExternalId(id))? else {
                bail!("record {id} does not exist");
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("failed to serialize record")?
            );
        }
        RecordCommand::Edit(args) => {
            let id = ExternalId(args.id);
            let Some(record) = engine.client().get(id)? else {
                bail!("record {id} does not exist");
            };
            let mut fields = record.fields;
            if let Some(title) = args.title {
                fields.title = title;
            }
            if let Some(description) = args.description {
                fields.description = description;
            }
            if args.summary.is_some() {
                fields.summary = args.summary;
            }
            engine
                .client_mut()
                .edit(id, fields)
                .context("failed to write record ledger")?;
            println!("✓ Record {id} updated");

            if !args.no_notify {
                match engine
                    .on_record_changed(id)
                    .with_context(|| format!("failed to propagate change of record {id}"))?
                {
                    Some(outcome) => print_outcome(&outcome),
                    None => println!("· Record {id} is not linked to any occurrence"),
                }
            }
        }
        RecordCommand::Offline => {
            engine.client_mut().set_online(false)?;
            println!("✓ Ledger offline");
        }
        RecordCommand::Online => {
            engine.client_mut().set_online(true)?;
            println!("✓ Ledger online");
        }
    }
    Ok(())
}
