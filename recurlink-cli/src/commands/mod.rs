pub mod init;
pub mod occurrence;
pub mod purge;
pub mod record;
pub mod sequence;
pub mod split;
pub mod status;
pub mod step;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use recurlink_core::settings;
use recurlink_sync::{
    local::{CatalogProvider, LedgerClient},
    CorrespondenceStore, ReconcileMode, ReconcileOptions, ReconcileOutcome, RequestContext,
    SyncEngine,
};

pub(crate) type Engine = SyncEngine<CatalogProvider, LedgerClient>;

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Engine over the local catalog, ledger and correspondence store.
/// `delete_unused` only ever turns the setting on.
pub(crate) fn open_engine(home: &Path, delete_unused: bool) -> Result<Engine> {
    let settings = settings::load_at(home).context("failed to load settings.yaml")?;
    let mut options = ReconcileOptions::from(&settings);
    options.delete_unused |= delete_unused;

    let client = LedgerClient::open_at(home).context("failed to open record ledger")?;
    let store =
        CorrespondenceStore::open_at(home).context("failed to open correspondence store")?;
    Ok(SyncEngine::new(
        CatalogProvider::new(home),
        client,
        store,
        RequestContext::new(options),
    ))
}

pub(crate) fn print_outcome(outcome: &ReconcileOutcome) {
    if outcome.mode == ReconcileMode::Noop {
        println!("· sequence {}: nothing to sync", outcome.sequence);
        return;
    }
    let mark = if outcome.failures.is_empty() {
        "✓".green()
    } else {
        "!".yellow()
    };
    println!(
        "{mark} sequence {} synced ({}): {} created, {} updated, {} unorphaned, {} disabled, {} deleted",
        outcome.sequence,
        outcome.mode,
        outcome.created.len(),
        outcome.updated.len(),
        outcome.unorphaned.len(),
        outcome.disabled.len(),
        outcome.deleted.len(),
    );
    for (occurrence, external) in &outcome.correspondences {
        println!("  {occurrence} → record {external}");
    }
    for external in &outcome.orphans {
        println!("  orphan record {external}");
    }
    for failure in &outcome.failures {
        println!("  {} {}: {}", "✗".red(), failure.operation, failure.message);
    }
}
