//! Local YAML sequence catalog.
//!
//! # Storage layout
//!
//! ```text
//! ~/.recurlink/
//!   sequences/
//!     <sequence_id>.yaml   (one file per sequence: mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};

use crate::error::CatalogError;
use crate::types::{OccurrenceDate, OccurrenceId, Sequence, SequenceId, SharedFields};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.recurlink/`: pure, no I/O.
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".recurlink")
}

/// `<home>/.recurlink/sequences/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn sequences_dir_at(home: &Path) -> Result<PathBuf, CatalogError> {
    let dir = root_at(home).join("sequences");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.recurlink/sequences/<id>.yaml`: pure, no I/O.
pub fn sequence_path_at(home: &Path, id: SequenceId) -> PathBuf {
    root_at(home).join("sequences").join(format!("{id}.yaml"))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a single sequence.
///
/// Returns `CatalogError::SequenceNotFound` if absent,
/// `CatalogError::Parse` (with path + line context) if malformed YAML.
pub fn load_sequence_at(home: &Path, id: SequenceId) -> Result<Sequence, CatalogError> {
    let path = sequence_path_at(home, id);
    if !path.exists() {
        return Err(CatalogError::SequenceNotFound { id, path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| CatalogError::Parse { path, source: e })
}

/// `load_sequence_at` convenience wrapper.
pub fn load_sequence(id: SequenceId) -> Result<Sequence, CatalogError> {
    load_sequence_at(&home()?, id)
}

/// Ids of every catalogued sequence, ascending.
pub fn list_sequence_ids_at(home: &Path) -> Result<Vec<SequenceId>, CatalogError> {
    let dir = root_at(home).join("sequences");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut ids: Vec<SequenceId> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".yaml")?.parse::<u64>().ok()
        })
        .map(SequenceId)
        .collect();
    ids.sort();
    Ok(ids)
}

/// Load every catalogued sequence, ordered by id.
pub fn list_sequences_at(home: &Path) -> Result<Vec<Sequence>, CatalogError> {
    list_sequence_ids_at(home)?
        .into_iter()
        .map(|id| load_sequence_at(home, id))
        .collect()
}

/// `list_sequences_at` convenience wrapper.
pub fn list_sequences() -> Result<Vec<Sequence>, CatalogError> {
    list_sequences_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a sequence to `<home>/.recurlink/sequences/<id>.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_sequence_at(home: &Path, sequence: &Sequence) -> Result<(), CatalogError> {
    sequences_dir_at(home)?;
    let path = sequence_path_at(home, sequence.id);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", sequence.id));

    let yaml = serde_yaml::to_string(sequence)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Remove a sequence file. Returns `false` if it did not exist.
pub fn delete_sequence_at(home: &Path, id: SequenceId) -> Result<bool, CatalogError> {
    let path = sequence_path_at(home, id);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// 4. Mutations
// ---------------------------------------------------------------------------

/// Add a new sequence with the next free id. Occurrence ids start at 1 in
/// the order the dates are given.
pub fn add_sequence_at(
    home: &Path,
    fields: SharedFields,
    dates: Vec<(NaiveDateTime, NaiveDateTime)>,
) -> Result<Sequence, CatalogError> {
    let next = list_sequence_ids_at(home)?
        .last()
        .map(|id| id.0 + 1)
        .unwrap_or(1);
    let now = Utc::now();
    let occurrences = dates
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| OccurrenceDate::new(i as u64 + 1, start, end))
        .collect();
    let sequence = Sequence {
        id: SequenceId(next),
        fields,
        occurrences,
        meta: Default::default(),
        created_at: now,
        updated_at: now,
    };
    save_sequence_at(home, &sequence)?;
    Ok(sequence)
}

/// `add_sequence_at` convenience wrapper.
pub fn add_sequence(
    fields: SharedFields,
    dates: Vec<(NaiveDateTime, NaiveDateTime)>,
) -> Result<Sequence, CatalogError> {
    add_sequence_at(&home()?, fields, dates)
}

/// Replace the recurrence of a sequence. Like a rule edit in the host, every
/// occurrence gets a fresh id.
pub fn reschedule_at(
    home: &Path,
    id: SequenceId,
    dates: Vec<(NaiveDateTime, NaiveDateTime)>,
) -> Result<Sequence, CatalogError> {
    let mut sequence = load_sequence_at(home, id)?;
    let first = sequence.next_occurrence_id().0;
    sequence.occurrences = dates
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| OccurrenceDate::new(first + i as u64, start, end))
        .collect();
    sequence.updated_at = Utc::now();
    save_sequence_at(home, &sequence)?;
    Ok(sequence)
}

/// Overwrite the shared fields of a sequence.
pub fn update_fields_at(
    home: &Path,
    id: SequenceId,
    fields: SharedFields,
) -> Result<Sequence, CatalogError> {
    let mut sequence = load_sequence_at(home, id)?;
    sequence.fields = fields;
    sequence.updated_at = Utc::now();
    save_sequence_at(home, &sequence)?;
    Ok(sequence)
}

/// Detach one occurrence into a new standalone sequence.
///
/// The new sequence copies the shared fields and every meta entry except
/// those named in `skip_meta`. The occurrence keeps its id.
pub fn break_occurrence_at(
    home: &Path,
    id: SequenceId,
    occurrence: OccurrenceId,
    skip_meta: &[&str],
) -> Result<Sequence, CatalogError> {
    let mut original = load_sequence_at(home, id)?;
    let Some(pos) = original
        .occurrences
        .iter()
        .position(|o| o.occurrence_id == occurrence)
    else {
        return Err(CatalogError::OccurrenceNotFound {
            sequence: id,
            occurrence,
        });
    };
    let detached = original.occurrences.remove(pos);

    let next = list_sequence_ids_at(home)?
        .last()
        .map(|id| id.0 + 1)
        .unwrap_or(1);
    let now = Utc::now();
    let standalone = Sequence {
        id: SequenceId(next),
        fields: original.fields.clone(),
        occurrences: vec![detached],
        meta: original
            .meta
            .iter()
            .filter(|(k, _)| !skip_meta.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        created_at: now,
        updated_at: now,
    };

    original.updated_at = now;
    save_sequence_at(home, &original)?;
    save_sequence_at(home, &standalone)?;
    Ok(standalone)
}

/// Remove one occurrence without touching the others' ids.
pub fn remove_occurrence_at(
    home: &Path,
    id: SequenceId,
    occurrence: OccurrenceId,
) -> Result<Sequence, CatalogError> {
    let mut sequence = load_sequence_at(home, id)?;
    let before = sequence.occurrences.len();
    sequence.occurrences.retain(|o| o.occurrence_id != occurrence);
    if sequence.occurrences.len() == before {
        return Err(CatalogError::OccurrenceNotFound {
            sequence: id,
            occurrence,
        });
    }
    sequence.updated_at = Utc::now();
    save_sequence_at(home, &sequence)?;
    Ok(sequence)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub(crate) fn home() -> Result<PathBuf, CatalogError> {
    dirs::home_dir().ok_or(CatalogError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CatalogError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CatalogError> {
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_file_permissions(path: &Path) -> Result<(), CatalogError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
pub(crate) fn set_file_permissions(_path: &Path) -> Result<(), CatalogError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
