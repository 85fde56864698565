//! Shared sync pipeline entrypoint used by the CLI.

use recurlink_core::types::SequenceId;

use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::ports::{ExternalRecordClient, SequenceProvider};
use crate::reconcile::ReconcileOutcome;

/// Scope for a sync pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Sync every sequence the provider lists.
    All,
    /// Sync a single sequence.
    Sequence(SequenceId),
}

/// Run the sync pipeline for a scope.
///
/// With [`SyncScope::All`] a failing sequence is logged and skipped; an
/// unavailable CRM or a store conflict stops the run.
pub fn run<P, C>(
    engine: &mut SyncEngine<P, C>,
    scope: SyncScope,
) -> Result<Vec<ReconcileOutcome>, SyncError>
where
    P: SequenceProvider,
    C: ExternalRecordClient,
{
    match scope {
        SyncScope::Sequence(id) => Ok(vec![engine.sync_sequence(id)?]),
        SyncScope::All => {
            let mut outcomes = Vec::new();
            for id in engine.provider().list_sequences()? {
                match engine.sync_sequence(id) {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err @ (SyncError::ClientUnavailable | SyncError::Conflict { .. })) => {
                        return Err(err)
                    }
                    Err(err) => tracing::error!("sequence {id}: sync failed: {err}"),
                }
            }
            Ok(outcomes)
        }
    }
}
