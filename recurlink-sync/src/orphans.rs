//! Orphan tracker.
//!
//! Orphans are rows of the correspondence table with no occurrence. They stay
//! attached to their sequence so a later occurrence with the same start time
//! can take them back.

use std::collections::BTreeSet;

use recurlink_core::types::{ExternalId, OccurrenceId, SequenceId};

use crate::correspondence::{CorrespondenceStore, Link, Slot};

/// Result of replacing a sequence's orphan set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanDiff {
    /// Ids that were not orphans of the sequence before.
    pub orphaned: BTreeSet<ExternalId>,
    /// Ids that were orphans before and are not any more.
    pub unorphaned: BTreeSet<ExternalId>,
}

impl CorrespondenceStore {
    /// Orphaned records of a sequence.
    pub fn orphans(&self, sequence: SequenceId) -> BTreeSet<ExternalId> {
        let Some(ids) = self.by_sequence.get(&sequence) else {
            return BTreeSet::new();
        };
        ids.iter()
            .filter(|id| matches!(self.rows.get(*id), Some(l) if l.slot == Slot::Orphan))
            .copied()
            .collect()
    }

    /// Sequence an orphaned record belongs to.
    pub fn orphan_owner(&self, external: ExternalId) -> Option<SequenceId> {
        match self.rows.get(&external)? {
            Link {
                sequence,
                slot: Slot::Orphan,
            } => Some(*sequence),
            _ => None,
        }
    }

    /// Replace the orphan set of a sequence.
    ///
    /// Ids dropped from the set lose their row unless they are live. Ids
    /// added to the set become orphans of this sequence, even if they were
    /// live before.
    pub fn set_orphans(&mut self, sequence: SequenceId, orphans: BTreeSet<ExternalId>) -> OrphanDiff {
        let previous = self.orphans(sequence);
        let diff = OrphanDiff {
            orphaned: orphans.difference(&previous).copied().collect(),
            unorphaned: previous.difference(&orphans).copied().collect(),
        };
        for id in &diff.unorphaned {
            self.remove(*id);
        }
        for id in &diff.orphaned {
            self.insert(
                *id,
                Link {
                    sequence,
                    slot: Slot::Orphan,
                },
            );
        }
        if !diff.orphaned.is_empty() || !diff.unorphaned.is_empty() {
            self.mark_dirty();
            tracing::debug!(
                "sequence {sequence}: {} orphaned, {} unorphaned",
                diff.orphaned.len(),
                diff.unorphaned.len()
            );
        }
        diff
    }

    /// Detach one record from its occurrence and keep it as an orphan of the
    /// sequence. Whatever record the occurrence was live for loses that slot.
    pub fn orphan_one(&mut self, sequence: SequenceId, occurrence: OccurrenceId, external: ExternalId) {
        if let Some(current) = self.forward(sequence).get(&occurrence).copied() {
            self.remove(current);
        }
        self.insert(
            external,
            Link {
                sequence,
                slot: Slot::Orphan,
            },
        );
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn live(store: &mut CorrespondenceStore, sequence: u64, pairs: &[(u64, u64)]) {
        let map: BTreeMap<OccurrenceId, ExternalId> = pairs
            .iter()
            .map(|(o, e)| (OccurrenceId(*o), ExternalId(*e)))
            .collect();
        store.set_forward(SequenceId(sequence), map);
    }

    fn ids(raw: &[u64]) -> BTreeSet<ExternalId> {
        raw.iter().map(|id| ExternalId(*id)).collect()
    }

    #[test]
    fn set_reports_diff_against_previous() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_orphans(SequenceId(1), ids(&[10, 11]));
        let diff = store.set_orphans(SequenceId(1), ids(&[11, 12]));
        assert_eq!(diff.orphaned, ids(&[12]));
        assert_eq!(diff.unorphaned, ids(&[10]));
        assert_eq!(store.orphans(SequenceId(1)), ids(&[11, 12]));
        assert_eq!(store.orphan_owner(ExternalId(10)), None);
        assert_eq!(store.orphan_owner(ExternalId(12)), Some(SequenceId(1)));
    }

    #[test]
    fn orphans_are_invisible_to_forward_and_reverse() {
        let mut store = CorrespondenceStore::in_memory();
        live(&mut store, 1, &[(1, 10)]);
        store.set_orphans(SequenceId(1), ids(&[11]));
        assert_eq!(store.forward(SequenceId(1)).len(), 1);
        assert_eq!(store.reverse(ExternalId(11)), None);
    }

    #[test]
    fn orphan_one_moves_live_record_to_orphans() {
        let mut store = CorrespondenceStore::in_memory();
        live(&mut store, 1, &[(1, 10), (2, 11)]);
        store.orphan_one(SequenceId(1), OccurrenceId(2), ExternalId(11));
        assert_eq!(
            store.forward(SequenceId(1)),
            BTreeMap::from([(OccurrenceId(1), ExternalId(10))])
        );
        assert_eq!(store.orphans(SequenceId(1)), ids(&[11]));
    }

    #[test]
    fn set_forward_unorphans_listed_ids() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_orphans(SequenceId(1), ids(&[11]));
        live(&mut store, 1, &[(5, 11)]);
        assert!(store.orphans(SequenceId(1)).is_empty());
        assert_eq!(
            store.reverse(ExternalId(11)),
            Some((SequenceId(1), OccurrenceId(5)))
        );
    }

    #[test]
    fn orphans_of_unknown_sequence_are_empty() {
        let store = CorrespondenceStore::in_memory();
        assert!(store.orphans(SequenceId(3)).is_empty());
    }
}
