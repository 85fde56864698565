//! Correspondence store: which CRM record backs which occurrence.
//!
//! One normalized table keyed by [`ExternalId`]. Each row says which sequence
//! owns the record and whether it is live (bound to an occurrence) or an
//! orphan. A per-sequence secondary index answers the forward direction, the
//! table itself answers the reverse direction, so the two can never disagree.
//!
//! Persisted as `<home>/.recurlink/correspondences.json`. Writes use the
//! `.tmp` + rename pattern. The SHA-256 of the file is remembered at load and
//! at every commit; a commit over a file someone else rewrote in between is
//! refused with [`SyncError::Conflict`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use recurlink_core::types::{ExternalId, OccurrenceId, SequenceId};

use crate::error::{io_err, SyncError};

const FILE_VERSION: u32 = 1;

/// Where a record currently sits within its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Live(OccurrenceId),
    Orphan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) sequence: SequenceId,
    pub(crate) slot: Slot,
}

/// On-disk row. `occurrence_id: null` marks an orphan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrespondenceRow {
    pub external_id: ExternalId,
    pub sequence_id: SequenceId,
    #[serde(default)]
    pub occurrence_id: Option<OccurrenceId>,
}

/// On-disk payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrespondenceFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub rows: Vec<CorrespondenceRow>,
}

/// Path to the correspondence table, rooted at `home`.
pub fn store_path_at(home: &Path) -> PathBuf {
    home.join(".recurlink").join("correspondences.json")
}

#[derive(Debug)]
pub struct CorrespondenceStore {
    path: Option<PathBuf>,
    /// Digest of the file as last seen; `None` when no file existed.
    fingerprint: Option<String>,
    pub(crate) rows: HashMap<ExternalId, Link>,
    pub(crate) by_sequence: HashMap<SequenceId, BTreeSet<ExternalId>>,
    dirty: bool,
}

impl CorrespondenceStore {
    /// A store that lives only in memory; [`commit`](Self::commit) is a no-op.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            fingerprint: None,
            rows: HashMap::new(),
            by_sequence: HashMap::new(),
            dirty: false,
        }
    }

    /// Load the table from `home`. Returns an empty store if the file does
    /// not yet exist.
    pub fn open_at(home: &Path) -> Result<Self, SyncError> {
        let path = store_path_at(home);
        let mut store = Self::in_memory();
        store.path = Some(path.clone());

        let Some(bytes) = read_if_exists(&path)? else {
            return Ok(store);
        };
        let file: CorrespondenceFile = serde_json::from_slice(&bytes)?;
        for row in file.rows {
            let slot = match row.occurrence_id {
                Some(occurrence) => Slot::Live(occurrence),
                None => Slot::Orphan,
            };
            store.insert(
                row.external_id,
                Link {
                    sequence: row.sequence_id,
                    slot,
                },
            );
        }
        store.fingerprint = Some(fingerprint(&bytes));
        store.dirty = false;
        Ok(store)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Live occurrence → record map of a sequence. Empty if none recorded.
    pub fn forward(&self, sequence: SequenceId) -> BTreeMap<OccurrenceId, ExternalId> {
        let Some(ids) = self.by_sequence.get(&sequence) else {
            return BTreeMap::new();
        };
        ids.iter()
            .filter_map(|id| match self.rows.get(id)?.slot {
                Slot::Live(occurrence) => Some((occurrence, *id)),
                Slot::Orphan => None,
            })
            .collect()
    }

    /// Sequence and occurrence a record is live for.
    pub fn reverse(&self, external: ExternalId) -> Option<(SequenceId, OccurrenceId)> {
        match self.rows.get(&external)? {
            Link {
                sequence,
                slot: Slot::Live(occurrence),
            } => Some((*sequence, *occurrence)),
            _ => None,
        }
    }

    /// Raw slot of a record, live or orphaned.
    pub fn slot(&self, external: ExternalId) -> Option<(SequenceId, Slot)> {
        self.rows.get(&external).map(|l| (l.sequence, l.slot))
    }

    /// Every sequence that owns at least one row, ascending.
    pub fn sequences(&self) -> Vec<SequenceId> {
        let mut ids: Vec<SequenceId> = self.by_sequence.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Replace the live map of a sequence. Callers pass the complete desired
    /// mapping; orphans of the sequence are left alone unless they appear in
    /// `map`, in which case they become live.
    pub fn set_forward(&mut self, sequence: SequenceId, map: BTreeMap<OccurrenceId, ExternalId>) {
        let stale: Vec<ExternalId> = self.forward(sequence).into_values().collect();
        for id in stale {
            self.remove(id);
        }
        for (occurrence, id) in map {
            self.insert(
                id,
                Link {
                    sequence,
                    slot: Slot::Live(occurrence),
                },
            );
        }
        self.dirty = true;
    }

    /// Remove one live correspondence. Orphans are never touched.
    ///
    /// Returns `false` if the triple was not recorded.
    pub fn clear_one(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
        external: ExternalId,
    ) -> bool {
        let expected = Link {
            sequence,
            slot: Slot::Live(occurrence),
        };
        if self.rows.get(&external) != Some(&expected) {
            return false;
        }
        self.remove(external);
        self.dirty = true;
        true
    }

    /// Remove every correspondence and every orphan of a sequence.
    pub fn clear_all(&mut self, sequence: SequenceId) -> usize {
        let Some(ids) = self.by_sequence.remove(&sequence) else {
            return 0;
        };
        for id in &ids {
            self.rows.remove(id);
        }
        self.dirty = true;
        ids.len()
    }

    /// Drop every row of every sequence.
    pub fn purge_all(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        self.by_sequence.clear();
        self.dirty = true;
        count
    }

    /// Replace both the live map and the orphan set of a sequence in one
    /// mutation. Nothing reaches disk until [`commit`](Self::commit).
    pub fn replace_sequence(
        &mut self,
        sequence: SequenceId,
        forward: BTreeMap<OccurrenceId, ExternalId>,
        orphans: BTreeSet<ExternalId>,
    ) {
        self.set_forward(sequence, forward);
        self.set_orphans(sequence, orphans);
    }

    pub(crate) fn insert(&mut self, id: ExternalId, link: Link) {
        if let Some(previous) = self.rows.insert(id, link) {
            if previous.sequence != link.sequence {
                self.unindex(previous.sequence, id);
            }
        }
        self.by_sequence.entry(link.sequence).or_default().insert(id);
    }

    pub(crate) fn remove(&mut self, id: ExternalId) -> Option<Link> {
        let link = self.rows.remove(&id)?;
        self.unindex(link.sequence, id);
        Some(link)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn unindex(&mut self, sequence: SequenceId, id: ExternalId) {
        if let Some(ids) = self.by_sequence.get_mut(&sequence) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_sequence.remove(&sequence);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the table if anything changed since the last load or commit.
    ///
    /// Fails with [`SyncError::Conflict`] if the file on disk no longer
    /// matches what this store loaded.
    pub fn commit(&mut self) -> Result<(), SyncError> {
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        if !self.dirty {
            tracing::debug!("correspondences unchanged: {}", path.display());
            return Ok(());
        }

        let on_disk = read_if_exists(&path)?.map(|bytes| fingerprint(&bytes));
        if on_disk != self.fingerprint {
            tracing::warn!("correspondence store changed underneath us: {}", path.display());
            return Err(SyncError::Conflict { path });
        }

        let json = serde_json::to_string_pretty(&self.to_file())?;
        let Some(dir) = path.parent() else {
            return Err(io_err(
                path,
                std::io::Error::other("invalid correspondence store path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }

        self.fingerprint = Some(fingerprint(json.as_bytes()));
        self.dirty = false;
        tracing::debug!("wrote correspondences: {}", path.display());
        Ok(())
    }

    /// Snapshot of the table, rows ordered by record id.
    pub fn to_file(&self) -> CorrespondenceFile {
        let mut rows: Vec<CorrespondenceRow> = self
            .rows
            .iter()
            .map(|(id, link)| CorrespondenceRow {
                external_id: *id,
                sequence_id: link.sequence,
                occurrence_id: match link.slot {
                    Slot::Live(occurrence) => Some(occurrence),
                    Slot::Orphan => None,
                },
            })
            .collect();
        rows.sort_by_key(|r| r.external_id);
        CorrespondenceFile {
            version: FILE_VERSION,
            updated_at: Utc::now(),
            rows,
        }
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn map(pairs: &[(u64, u64)]) -> BTreeMap<OccurrenceId, ExternalId> {
        pairs
            .iter()
            .map(|(o, e)| (OccurrenceId(*o), ExternalId(*e)))
            .collect()
    }

    #[test]
    fn forward_of_unknown_sequence_is_empty() {
        let store = CorrespondenceStore::in_memory();
        assert!(store.forward(SequenceId(1)).is_empty());
        assert_eq!(store.reverse(ExternalId(1)), None);
    }

    #[test]
    fn set_forward_answers_both_directions() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10), (2, 11)]));
        assert_eq!(store.forward(SequenceId(1)), map(&[(1, 10), (2, 11)]));
        assert_eq!(
            store.reverse(ExternalId(11)),
            Some((SequenceId(1), OccurrenceId(2)))
        );
    }

    #[test]
    fn set_forward_replaces_rather_than_merges() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10), (2, 11)]));
        store.set_forward(SequenceId(1), map(&[(3, 11)]));
        assert_eq!(store.forward(SequenceId(1)), map(&[(3, 11)]));
        assert_eq!(store.reverse(ExternalId(10)), None);
        assert_eq!(
            store.reverse(ExternalId(11)),
            Some((SequenceId(1), OccurrenceId(3)))
        );
    }

    #[test]
    fn set_forward_leaves_other_sequences_alone() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10)]));
        store.set_forward(SequenceId(2), map(&[(1, 20)]));
        store.set_forward(SequenceId(1), BTreeMap::new());
        assert!(store.forward(SequenceId(1)).is_empty());
        assert_eq!(store.forward(SequenceId(2)), map(&[(1, 20)]));
        assert_eq!(store.sequences(), vec![SequenceId(2)]);
    }

    #[test]
    fn clear_one_requires_exact_triple() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10), (2, 11)]));
        assert!(!store.clear_one(SequenceId(1), OccurrenceId(1), ExternalId(11)));
        assert!(store.clear_one(SequenceId(1), OccurrenceId(1), ExternalId(10)));
        assert_eq!(store.forward(SequenceId(1)), map(&[(2, 11)]));
    }

    #[test]
    fn clear_one_does_not_touch_orphans() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10)]));
        store.set_orphans(SequenceId(1), BTreeSet::from([ExternalId(12)]));
        store.clear_one(SequenceId(1), OccurrenceId(1), ExternalId(10));
        assert_eq!(store.orphans(SequenceId(1)), BTreeSet::from([ExternalId(12)]));
    }

    #[test]
    fn clear_all_removes_live_and_orphans() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10)]));
        store.set_orphans(SequenceId(1), BTreeSet::from([ExternalId(12)]));
        store.set_forward(SequenceId(2), map(&[(1, 20)]));
        assert_eq!(store.clear_all(SequenceId(1)), 2);
        assert!(store.forward(SequenceId(1)).is_empty());
        assert!(store.orphans(SequenceId(1)).is_empty());
        assert_eq!(store.orphan_owner(ExternalId(12)), None);
        assert_eq!(store.forward(SequenceId(2)), map(&[(1, 20)]));
    }

    #[test]
    fn purge_all_empties_every_sequence() {
        let mut store = CorrespondenceStore::in_memory();
        store.set_forward(SequenceId(1), map(&[(1, 10)]));
        store.set_forward(SequenceId(2), map(&[(1, 20)]));
        assert_eq!(store.purge_all(), 2);
        assert!(store.is_empty());
        assert!(store.sequences().is_empty());
    }

    #[test]
    fn commit_then_open_roundtrip() {
        let home = TempDir::new().unwrap();
        let mut store = CorrespondenceStore::open_at(home.path()).unwrap();
        store.set_forward(SequenceId(1), map(&[(1, 10), (2, 11)]));
        store.set_orphans(SequenceId(1), BTreeSet::from([ExternalId(9)]));
        store.commit().unwrap();

        let loaded = CorrespondenceStore::open_at(home.path()).unwrap();
        assert_eq!(loaded.forward(SequenceId(1)), map(&[(1, 10), (2, 11)]));
        assert_eq!(loaded.orphans(SequenceId(1)), BTreeSet::from([ExternalId(9)]));
        let tmp = store_path_at(home.path()).with_extension("json.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after atomic rename");
    }

    #[test]
    fn commit_refuses_when_file_changed_underneath() {
        let home = TempDir::new().unwrap();
        let mut first = CorrespondenceStore::open_at(home.path()).unwrap();
        let mut second = CorrespondenceStore::open_at(home.path()).unwrap();

        first.set_forward(SequenceId(1), map(&[(1, 10)]));
        first.commit().unwrap();

        second.set_forward(SequenceId(1), map(&[(1, 99)]));
        let err = second.commit().unwrap_err();
        assert!(matches!(err, SyncError::Conflict { .. }), "got: {err}");

        let reloaded = CorrespondenceStore::open_at(home.path()).unwrap();
        assert_eq!(reloaded.forward(SequenceId(1)), map(&[(1, 10)]));
    }

    #[test]
    fn sequential_commits_from_one_store_succeed() {
        let home = TempDir::new().unwrap();
        let mut store = CorrespondenceStore::open_at(home.path()).unwrap();
        store.set_forward(SequenceId(1), map(&[(1, 10)]));
        store.commit().unwrap();
        store.set_forward(SequenceId(1), map(&[(1, 10), (2, 11)]));
        store.commit().unwrap();
        let loaded = CorrespondenceStore::open_at(home.path()).unwrap();
        assert_eq!(loaded.forward(SequenceId(1)).len(), 2);
    }

    #[test]
    fn unchanged_store_does_not_write() {
        let home = TempDir::new().unwrap();
        let mut store = CorrespondenceStore::open_at(home.path()).unwrap();
        store.commit().unwrap();
        assert!(!store_path_at(home.path()).exists());
    }
}
