//! Sequence-break handler.
//!
//! Breaking an occurrence out of its sequence creates a new standalone
//! sequence in the host. The record backing that occurrence must follow it:
//! it leaves the old sequence's map before the host copies custom fields, and
//! is written under the new sequence once the host reports the new id.

use std::collections::BTreeMap;

use recurlink_core::types::{ExternalId, OccurrenceId, SequenceId};

use crate::correspondence::CorrespondenceStore;

/// Custom field the host must not copy onto the broken-out sequence.
pub const CORRESPONDENCE_FIELD: &str = "_recurlink_correspondences";

/// A break that has started but not finished.
///
/// Only [`after_break`] or [`PendingBreak::abort`] consume it.
#[derive(Debug)]
#[must_use = "a pending break must be completed with after_break or aborted"]
pub struct PendingBreak {
    sequence: SequenceId,
    occurrence: OccurrenceId,
    external: Option<ExternalId>,
}

impl PendingBreak {
    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }

    pub fn occurrence(&self) -> OccurrenceId {
        self.occurrence
    }

    /// Record that backed the occurrence, if it was synced.
    pub fn external_id(&self) -> Option<ExternalId> {
        self.external
    }

    /// Fields the host skips when duplicating custom fields.
    pub fn skipped_fields(&self) -> &'static [&'static str] {
        &[CORRESPONDENCE_FIELD]
    }

    /// Put the correspondence back when the host break failed.
    pub fn abort(self, store: &mut CorrespondenceStore) {
        let Some(external) = self.external else {
            return;
        };
        let mut forward = store.forward(self.sequence);
        forward.insert(self.occurrence, external);
        store.set_forward(self.sequence, forward);
        tracing::debug!(
            "sequence {}: break of occurrence {} aborted, record {external} restored",
            self.sequence,
            self.occurrence
        );
    }
}

/// First phase: capture and detach the occurrence's record.
pub fn before_break(
    store: &mut CorrespondenceStore,
    sequence: SequenceId,
    occurrence: OccurrenceId,
) -> PendingBreak {
    let external = store.forward(sequence).get(&occurrence).copied();
    if let Some(external) = external {
        store.clear_one(sequence, occurrence, external);
    }
    PendingBreak {
        sequence,
        occurrence,
        external,
    }
}

/// Second phase: the record now backs the same occurrence of `new_sequence`.
pub fn after_break(store: &mut CorrespondenceStore, pending: PendingBreak, new_sequence: SequenceId) {
    let Some(external) = pending.external else {
        tracing::debug!(
            "sequence {}: occurrence {} had no record, nothing to move",
            pending.sequence,
            pending.occurrence
        );
        return;
    };
    store.set_forward(new_sequence, BTreeMap::from([(pending.occurrence, external)]));
    tracing::info!(
        "record {external} moved from sequence {} to {new_sequence}",
        pending.sequence
    );
}
