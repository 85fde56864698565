//! Stepped bulk sync: offset-based pagination over every sequence.
//!
//! Each call reconciles one batch and advances a durable offset stored in
//! `<home>/.recurlink/steps.json`. A call that finds nothing left reports
//! `finished` and removes the offset, so the next call starts over.
//! Writes use the same atomic `.tmp` + rename pattern as the catalog.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::SyncEngine;
use crate::error::{io_err, SyncError};
use crate::ports::{ExternalRecordClient, SequenceProvider};

/// Job key for the "sync every sequence" bulk job.
pub const SEQUENCES_JOB: &str = "sequences";

/// On-disk offsets, keyed by job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepCursorFile {
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub offsets: BTreeMap<String, usize>,
}

impl Default for StepCursorFile {
    fn default() -> Self {
        Self {
            updated_at: Utc::now(),
            offsets: BTreeMap::new(),
        }
    }
}

/// Result of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub finished: bool,
    /// Offset this step started at.
    pub from: usize,
    /// Offset the next step starts at (exclusive end of this batch).
    pub to: usize,
    /// Sequences in this batch that errored or reported item failures.
    pub failed: usize,
}

/// `~/.recurlink/steps.json`
pub fn cursor_path_at(home: &Path) -> PathBuf {
    home.join(".recurlink").join("steps.json")
}

/// Load the offsets. Returns an empty cursor if the file does not yet exist.
pub fn load_at(home: &Path) -> Result<StepCursorFile, SyncError> {
    let path = cursor_path_at(home);
    if !path.exists() {
        return Ok(StepCursorFile::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_at(home: &Path, cursor: &StepCursorFile) -> Result<(), SyncError> {
    let path = cursor_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid step cursor path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(cursor)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Forget the offset of `job`. Returns the offset that was stored.
pub fn reset_at(home: &Path, job: &str) -> Result<Option<usize>, SyncError> {
    let mut cursor = load_at(home)?;
    let previous = cursor.offsets.remove(job);
    if previous.is_some() {
        cursor.updated_at = Utc::now();
        save_at(home, &cursor)?;
    }
    Ok(previous)
}

/// Reconcile the next `batch_size` sequences.
///
/// Per-sequence errors are logged and counted in [`StepReport::failed`]; the
/// offset still moves past them. An unavailable CRM or a store conflict
/// aborts the step and leaves the offset where it was.
pub fn step_sequences<P, C>(
    home: &Path,
    engine: &mut SyncEngine<P, C>,
    batch_size: usize,
) -> Result<StepReport, SyncError>
where
    P: SequenceProvider,
    C: ExternalRecordClient,
{
    let batch_size = batch_size.max(1);
    let mut cursor = load_at(home)?;
    let from = cursor.offsets.get(SEQUENCES_JOB).copied().unwrap_or(0);

    if !engine.client().is_available() {
        return Err(SyncError::ClientUnavailable);
    }

    let batch: Vec<_> = engine
        .provider()
        .list_sequences()?
        .into_iter()
        .skip(from)
        .take(batch_size)
        .collect();

    if batch.is_empty() {
        cursor.offsets.remove(SEQUENCES_JOB);
        cursor.updated_at = Utc::now();
        save_at(home, &cursor)?;
        tracing::info!("stepped sync finished at offset {from}");
        return Ok(StepReport {
            finished: true,
            from,
            to: from,
            failed: 0,
        });
    }

    let mut failed = 0;
    for sequence in &batch {
        match engine.sync_sequence(*sequence) {
            Ok(outcome) if outcome.failures.is_empty() => {}
            Ok(outcome) => {
                tracing::warn!(
                    "sequence {sequence}: {} item failures during stepped sync",
                    outcome.failures.len()
                );
                failed += 1;
            }
            Err(err @ (SyncError::ClientUnavailable | SyncError::Conflict { .. })) => {
                return Err(err);
            }
            Err(err) => {
                tracing::error!("sequence {sequence}: stepped sync failed: {err}");
                failed += 1;
            }
        }
    }

    let to = from + batch.len();
    cursor.offsets.insert(SEQUENCES_JOB.to_string(), to);
    cursor.updated_at = Utc::now();
    save_at(home, &cursor)?;
    tracing::info!("stepped sync processed {from}..{to} ({failed} failed)");
    Ok(StepReport {
        finished: false,
        from,
        to,
        failed,
    })
}
