//! File-backed collaborators used by the `recurlink` binary.
//!
//! - [`CatalogProvider`] reads and writes the YAML sequence catalog.
//! - [`LedgerClient`] keeps CRM records in `<home>/.recurlink/records.json`
//!   and persists after every write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use recurlink_core::catalog;
use recurlink_core::error::CatalogError;
use recurlink_core::types::{
    EventType, ExternalId, ExternalRecord, OccurrenceDate, OccurrenceId, RecordFields, Sequence,
    SequenceId, SharedFields,
};

use crate::error::{io_err, ClientError, ProviderError, SyncError};
use crate::ports::{ExternalRecordClient, SequenceProvider};

// ---------------------------------------------------------------------------
// CatalogProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CatalogProvider {
    home: PathBuf,
}

impl CatalogProvider {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn load(&self, sequence: SequenceId) -> Result<Option<Sequence>, ProviderError> {
        match catalog::load_sequence_at(&self.home, sequence) {
            Ok(s) => Ok(Some(s)),
            Err(CatalogError::SequenceNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl SequenceProvider for CatalogProvider {
    fn list_sequences(&self) -> Result<Vec<SequenceId>, ProviderError> {
        Ok(catalog::list_sequence_ids_at(&self.home)?)
    }

    fn occurrences(&self, sequence: SequenceId) -> Result<Option<Vec<OccurrenceDate>>, ProviderError> {
        Ok(self.load(sequence)?.map(|s| s.sorted_dates()))
    }

    fn shared_fields(&self, sequence: SequenceId) -> Result<Option<SharedFields>, ProviderError> {
        Ok(self.load(sequence)?.map(|s| s.fields))
    }

    fn apply_shared_fields(
        &mut self,
        sequence: SequenceId,
        fields: &SharedFields,
    ) -> Result<(), ProviderError> {
        catalog::update_fields_at(&self.home, sequence, fields.clone())?;
        Ok(())
    }

    fn break_occurrence(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
        skip_fields: &[&str],
    ) -> Result<SequenceId, ProviderError> {
        Ok(catalog::break_occurrence_at(&self.home, sequence, occurrence, skip_fields)?.id)
    }
}

// ---------------------------------------------------------------------------
// LedgerClient
// ---------------------------------------------------------------------------

/// On-disk ledger payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerFile {
    /// An offline ledger refuses every reconciliation.
    #[serde(default = "default_online")]
    pub online: bool,
    pub next_id: u64,
    #[serde(default)]
    pub records: BTreeMap<ExternalId, RecordFields>,
    #[serde(default = "default_event_types")]
    pub event_types: Vec<EventType>,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            online: true,
            next_id: 1,
            records: BTreeMap::new(),
            event_types: default_event_types(),
        }
    }
}

fn default_online() -> bool {
    true
}

fn default_event_types() -> Vec<EventType> {
    [
        "Conference",
        "Exhibition",
        "Fundraiser",
        "Meeting",
        "Performance",
        "Workshop",
    ]
    .iter()
    .zip(1u64..)
    .map(|(label, id)| EventType {
        id,
        label: (*label).to_string(),
    })
    .collect()
}

/// `~/.recurlink/records.json`
pub fn ledger_path_at(home: &Path) -> PathBuf {
    home.join(".recurlink").join("records.json")
}

#[derive(Debug)]
pub struct LedgerClient {
    path: PathBuf,
    ledger: LedgerFile,
}

impl LedgerClient {
    /// Open the ledger under `home`; a missing file is an empty, online ledger.
    pub fn open_at(home: &Path) -> Result<Self, SyncError> {
        let path = ledger_path_at(home);
        let ledger = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            serde_json::from_str(&contents)?
        } else {
            LedgerFile::default()
        };
        Ok(Self { path, ledger })
    }

    pub fn ledger(&self) -> &LedgerFile {
        &self.ledger
    }

    pub fn set_online(&mut self, online: bool) -> Result<(), SyncError> {
        let mut next = self.ledger.clone();
        next.online = online;
        self.replace(next)
    }

    /// Overwrite a record as a CRM user would. Does not notify anyone.
    pub fn edit(&mut self, id: ExternalId, fields: RecordFields) -> Result<bool, SyncError> {
        if !self.ledger.records.contains_key(&id) {
            return Ok(false);
        }
        let mut next = self.ledger.clone();
        next.records.insert(id, fields);
        self.replace(next)?;
        Ok(true)
    }

    /// Write `next` to disk, then adopt it. A failed write leaves the
    /// in-memory ledger as it was.
    fn replace(&mut self, next: LedgerFile) -> Result<(), SyncError> {
        write_ledger(&self.path, &next)?;
        self.ledger = next;
        Ok(())
    }

    /// Apply one CRM call to a copy of the ledger and keep it only once it
    /// is on disk.
    fn apply<T>(
        &mut self,
        operation: &'static str,
        change: impl FnOnce(&mut LedgerFile) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut next = self.ledger.clone();
        let value = change(&mut next)?;
        self.replace(next).map_err(|e| ClientError::new(operation, e.to_string()))?;
        Ok(value)
    }
}

fn write_ledger(path: &Path, ledger: &LedgerFile) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid ledger path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let json = serde_json::to_string_pretty(ledger)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn existing<'a>(
    ledger: &'a mut LedgerFile,
    operation: &'static str,
    id: ExternalId,
) -> Result<&'a mut RecordFields, ClientError> {
    ledger
        .records
        .get_mut(&id)
        .ok_or_else(|| ClientError::new(operation, format!("record {id} does not exist")))
}

impl ExternalRecordClient for LedgerClient {
    fn is_available(&self) -> bool {
        self.ledger.online
    }

    fn create(&mut self, fields: &RecordFields) -> Result<ExternalId, ClientError> {
        self.apply("create", |ledger| {
            let id = ExternalId(ledger.next_id);
            ledger.next_id += 1;
            ledger.records.insert(id, fields.clone());
            Ok(id)
        })
    }

    fn update(&mut self, id: ExternalId, fields: &RecordFields) -> Result<(), ClientError> {
        self.apply("update", |ledger| {
            *existing(ledger, "update", id)? = fields.clone();
            Ok(())
        })
    }

    fn disable(&mut self, id: ExternalId) -> Result<(), ClientError> {
        self.apply("disable", |ledger| {
            existing(ledger, "disable", id)?.is_active = false;
            Ok(())
        })
    }

    fn delete(&mut self, id: ExternalId) -> Result<(), ClientError> {
        self.apply("delete", |ledger| match ledger.records.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ClientError::new("delete", format!("record {id} does not exist"))),
        })
    }

    fn get(&self, id: ExternalId) -> Result<Option<ExternalRecord>, ClientError> {
        Ok(self.ledger.records.get(&id).map(|fields| ExternalRecord {
            id,
            fields: fields.clone(),
        }))
    }

    fn event_types(&self) -> Result<Vec<EventType>, ClientError> {
        Ok(self.ledger.event_types.clone())
    }
}
