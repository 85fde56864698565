//! `recurlink status`: how far each sequence is linked to the ledger.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use recurlink_core::{catalog, types::SequenceId};
use recurlink_sync::{
    local::LedgerClient,
    stepped::{self, SEQUENCES_JOB},
    CorrespondenceStore,
};

/// Arguments for `recurlink status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let report = build_report(&home)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum LinkState {
    Synced,
    Partial,
    NeverSynced,
    Empty,
    /// Rows remain for a sequence the catalog no longer has.
    Stray,
}

#[derive(Debug, Serialize)]
struct SequenceStatus {
    id: SequenceId,
    title: Option<String>,
    occurrences: usize,
    live: usize,
    orphans: usize,
    state: LinkState,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    ledger_online: bool,
    records: usize,
    step_offset: Option<usize>,
    sequences: Vec<SequenceStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "id")]
    id: SequenceId,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "occurrences")]
    occurrences: usize,
    #[tabled(rename = "live")]
    live: usize,
    #[tabled(rename = "orphans")]
    orphans: usize,
    #[tabled(rename = "state")]
    state: String,
}

fn build_report(home: &Path) -> Result<StatusReport> {
    let sequences =
        catalog::list_sequences_at(home).context("failed to load the sequence catalog")?;
    let store =
        CorrespondenceStore::open_at(home).context("failed to open correspondence store")?;
    let ledger = LedgerClient::open_at(home).context("failed to open record ledger")?;
    let cursor = stepped::load_at(home).context("failed to load stepped sync offsets")?;

    let mut seen = BTreeSet::new();
    let mut rows = Vec::new();
    for sequence in &sequences {
        seen.insert(sequence.id);
        let live = store.forward(sequence.id).len();
        let orphans = store.orphans(sequence.id).len();
        let occurrences = sequence.occurrences.len();
        let state = if occurrences == 0 {
            LinkState::Empty
        } else if live == 0 {
            LinkState::NeverSynced
        } else if live < occurrences {
            LinkState::Partial
        } else {
            LinkState::Synced
        };
        rows.push(SequenceStatus {
            id: sequence.id,
            title: Some(sequence.fields.title.clone()),
            occurrences,
            live,
            orphans,
            state,
        });
    }
    for id in store.sequences() {
        if seen.contains(&id) {
            continue;
        }
        rows.push(SequenceStatus {
            id,
            title: None,
            occurrences: 0,
            live: store.forward(id).len(),
            orphans: store.orphans(id).len(),
            state: LinkState::Stray,
        });
    }

    Ok(StatusReport {
        ledger_online: ledger.ledger().online,
        records: ledger.ledger().records.len(),
        step_offset: cursor.offsets.get(SEQUENCES_JOB).copied(),
        sequences: rows,
    })
}

fn print_table(report: &StatusReport) {
    let ledger = if report.ledger_online {
        "online".green()
    } else {
        "offline".red()
    };
    println!(
        "recurlink v{} | {} sequences | {} records | ledger {}",
        env!("CARGO_PKG_VERSION"),
        report.sequences.len(),
        report.records,
        ledger,
    );
    if let Some(offset) = report.step_offset {
        println!("Stepped sync paused at offset {offset}.");
    }

    if report.sequences.is_empty() {
        println!("No sequences catalogued.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = report
        .sequences
        .iter()
        .map(|row| StatusTableRow {
            id: row.id,
            title: row.title.clone().unwrap_or_else(|| "(removed)".to_string()),
            occurrences: row.occurrences,
            live: row.live,
            orphans: row.orphans,
            state: state_label(row.state),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if report
        .sequences
        .iter()
        .any(|row| matches!(row.state, LinkState::NeverSynced | LinkState::Partial))
    {
        println!("Run 'recurlink sync --all' to link the remaining occurrences.");
    }
}

fn state_label(state: LinkState) -> String {
    match state {
        LinkState::Synced => "SYNCED".green().bold().to_string(),
        LinkState::Partial => "PARTIAL".yellow().bold().to_string(),
        LinkState::NeverSynced => "NEVER SYNCED".bright_black().bold().to_string(),
        LinkState::Empty => "EMPTY".bright_black().to_string(),
        LinkState::Stray => "STRAY".magenta().bold().to_string(),
    }
}
