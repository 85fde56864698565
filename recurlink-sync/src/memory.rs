//! In-process collaborators.
//!
//! [`MemorySequenceProvider`] and [`MemoryRecordClient`] hold everything in
//! memory, log every call, and can be told to fail specific calls. They can
//! also observe a [`Listeners`] registry and note whether each write arrived
//! while its callback was suspended.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDateTime, Utc};

use recurlink_core::types::{
    EventType, ExternalId, ExternalRecord, OccurrenceDate, OccurrenceId, RecordFields, Sequence,
    SequenceId, SharedFields,
};

use crate::error::{ClientError, ProviderError};
use crate::listeners::{Listener, Listeners};
use crate::ports::{ExternalRecordClient, SequenceProvider};

// ---------------------------------------------------------------------------
// Sequence provider
// ---------------------------------------------------------------------------

/// One `apply_shared_fields` call as the provider saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedFields {
    pub sequence: SequenceId,
    pub fields: SharedFields,
    /// Whether "sequence saved" was active when the write arrived.
    pub save_listener_active: bool,
}

#[derive(Debug, Default)]
pub struct MemorySequenceProvider {
    sequences: BTreeMap<SequenceId, Sequence>,
    applied: Vec<AppliedFields>,
    observer: Option<Listeners>,
    fail_breaks: bool,
}

impl MemorySequenceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `listeners` when recording writes.
    pub fn observe(&mut self, listeners: Listeners) {
        self.observer = Some(listeners);
    }

    /// Add a sequence with the next free id.
    pub fn add(&mut self, fields: SharedFields, occurrences: Vec<OccurrenceDate>) -> SequenceId {
        let id = SequenceId(self.next_id());
        let now = Utc::now();
        self.sequences.insert(
            id,
            Sequence {
                id,
                fields,
                occurrences,
                meta: BTreeMap::new(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Replace the occurrences of a sequence. Unknown ids are ignored.
    pub fn set_occurrences(&mut self, id: SequenceId, occurrences: Vec<OccurrenceDate>) {
        if let Some(sequence) = self.sequences.get_mut(&id) {
            sequence.occurrences = occurrences;
            sequence.updated_at = Utc::now();
        }
    }

    pub fn set_meta(&mut self, id: SequenceId, key: &str, value: &str) {
        if let Some(sequence) = self.sequences.get_mut(&id) {
            sequence.meta.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove(&mut self, id: SequenceId) -> Option<Sequence> {
        self.sequences.remove(&id)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    pub fn applied(&self) -> &[AppliedFields] {
        &self.applied
    }

    /// Make every later `break_occurrence` fail.
    pub fn fail_breaks(&mut self, fail: bool) {
        self.fail_breaks = fail;
    }

    fn next_id(&self) -> u64 {
        self.sequences.keys().last().map_or(1, |id| id.0 + 1)
    }

    fn not_found(id: SequenceId) -> ProviderError {
        ProviderError::Other(format!("sequence {id} not found"))
    }
}

impl SequenceProvider for MemorySequenceProvider {
    fn list_sequences(&self) -> Result<Vec<SequenceId>, ProviderError> {
        Ok(self.sequences.keys().copied().collect())
    }

    fn occurrences(&self, sequence: SequenceId) -> Result<Option<Vec<OccurrenceDate>>, ProviderError> {
        Ok(self.sequences.get(&sequence).map(Sequence::sorted_dates))
    }

    fn shared_fields(&self, sequence: SequenceId) -> Result<Option<SharedFields>, ProviderError> {
        Ok(self.sequences.get(&sequence).map(|s| s.fields.clone()))
    }

    fn apply_shared_fields(
        &mut self,
        sequence: SequenceId,
        fields: &SharedFields,
    ) -> Result<(), ProviderError> {
        let save_listener_active = self
            .observer
            .as_ref()
            .map_or(true, |l| l.is_active(Listener::SequenceSaved));
        let target = self
            .sequences
            .get_mut(&sequence)
            .ok_or_else(|| Self::not_found(sequence))?;
        target.fields = fields.clone();
        target.updated_at = Utc::now();
        self.applied.push(AppliedFields {
            sequence,
            fields: fields.clone(),
            save_listener_active,
        });
        Ok(())
    }

    fn break_occurrence(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
        skip_fields: &[&str],
    ) -> Result<SequenceId, ProviderError> {
        if self.fail_breaks {
            return Err(ProviderError::Other("break refused".to_string()));
        }
        let new_id = SequenceId(self.next_id());
        let original = self
            .sequences
            .get_mut(&sequence)
            .ok_or_else(|| Self::not_found(sequence))?;
        let Some(pos) = original
            .occurrences
            .iter()
            .position(|o| o.occurrence_id == occurrence)
        else {
            return Err(ProviderError::Other(format!(
                "sequence {sequence} has no occurrence {occurrence}"
            )));
        };
        let detached = original.occurrences.remove(pos);
        let now = Utc::now();
        let standalone = Sequence {
            id: new_id,
            fields: original.fields.clone(),
            occurrences: vec![detached],
            meta: original
                .meta
                .iter()
                .filter(|(k, _)| !skip_fields.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            created_at: now,
            updated_at: now,
        };
        self.sequences.insert(new_id, standalone);
        Ok(new_id)
    }
}

// ---------------------------------------------------------------------------
// Record client
// ---------------------------------------------------------------------------

/// A call the client received, logged before it succeeds or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCall {
    Create(NaiveDateTime),
    Update(ExternalId),
    Disable(ExternalId),
    Delete(ExternalId),
    Get(ExternalId),
}

impl ClientCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, ClientCall::Get(_))
    }
}

#[derive(Debug)]
pub struct MemoryRecordClient {
    records: BTreeMap<ExternalId, RecordFields>,
    next_id: u64,
    available: bool,
    event_types: Vec<EventType>,
    calls: RefCell<Vec<ClientCall>>,
    fail_create_at: HashSet<NaiveDateTime>,
    fail_update: HashSet<ExternalId>,
    fail_disable: HashSet<ExternalId>,
    fail_delete: HashSet<ExternalId>,
    fail_get: HashSet<ExternalId>,
    observer: Option<Listeners>,
    unguarded_writes: usize,
}

impl Default for MemoryRecordClient {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            available: true,
            event_types: Vec::new(),
            calls: RefCell::new(Vec::new()),
            fail_create_at: HashSet::new(),
            fail_update: HashSet::new(),
            fail_disable: HashSet::new(),
            fail_delete: HashSet::new(),
            fail_get: HashSet::new(),
            observer: None,
            unguarded_writes: 0,
        }
    }
}

impl MemoryRecordClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = types;
        self
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Count writes that arrive while "record changed" is active.
    pub fn observe(&mut self, listeners: Listeners) {
        self.observer = Some(listeners);
    }

    pub fn unguarded_writes(&self) -> usize {
        self.unguarded_writes
    }

    /// Seed a record without logging a call.
    pub fn insert(&mut self, fields: RecordFields) -> ExternalId {
        let id = ExternalId(self.next_id);
        self.next_id += 1;
        self.records.insert(id, fields);
        id
    }

    pub fn record(&self, id: ExternalId) -> Option<&RecordFields> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&mut self) {
        self.calls.get_mut().clear();
    }

    pub fn fail_create_at(&mut self, start: NaiveDateTime) {
        self.fail_create_at.insert(start);
    }

    pub fn fail_update(&mut self, id: ExternalId) {
        self.fail_update.insert(id);
    }

    pub fn fail_disable(&mut self, id: ExternalId) {
        self.fail_disable.insert(id);
    }

    pub fn fail_delete(&mut self, id: ExternalId) {
        self.fail_delete.insert(id);
    }

    pub fn fail_get(&mut self, id: ExternalId) {
        self.fail_get.insert(id);
    }

    pub fn clear_failures(&mut self) {
        self.fail_create_at.clear();
        self.fail_update.clear();
        self.fail_disable.clear();
        self.fail_delete.clear();
        self.fail_get.clear();
    }

    fn log(&mut self, call: ClientCall) {
        if call.is_write()
            && self
                .observer
                .as_ref()
                .is_some_and(|l| l.is_active(Listener::RecordChanged))
        {
            self.unguarded_writes += 1;
        }
        self.calls.get_mut().push(call);
    }

    fn missing(operation: &'static str, id: ExternalId) -> ClientError {
        ClientError::new(operation, format!("record {id} does not exist"))
    }
}

impl ExternalRecordClient for MemoryRecordClient {
    fn is_available(&self) -> bool {
        self.available
    }

    fn create(&mut self, fields: &RecordFields) -> Result<ExternalId, ClientError> {
        self.log(ClientCall::Create(fields.start));
        if self.fail_create_at.contains(&fields.start) {
            return Err(ClientError::new("create", "injected failure"));
        }
        Ok(self.insert(fields.clone()))
    }

    fn update(&mut self, id: ExternalId, fields: &RecordFields) -> Result<(), ClientError> {
        self.log(ClientCall::Update(id));
        if self.fail_update.contains(&id) {
            return Err(ClientError::new("update", "injected failure"));
        }
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Self::missing("update", id))?;
        *record = fields.clone();
        Ok(())
    }

    fn disable(&mut self, id: ExternalId) -> Result<(), ClientError> {
        self.log(ClientCall::Disable(id));
        if self.fail_disable.contains(&id) {
            return Err(ClientError::new("disable", "injected failure"));
        }
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Self::missing("disable", id))?;
        record.is_active = false;
        Ok(())
    }

    fn delete(&mut self, id: ExternalId) -> Result<(), ClientError> {
        self.log(ClientCall::Delete(id));
        if self.fail_delete.contains(&id) {
            return Err(ClientError::new("delete", "injected failure"));
        }
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::missing("delete", id))
    }

    fn get(&self, id: ExternalId) -> Result<Option<ExternalRecord>, ClientError> {
        self.calls.borrow_mut().push(ClientCall::Get(id));
        if self.fail_get.contains(&id) {
            return Err(ClientError::new("get", "injected failure"));
        }
        Ok(self.records.get(&id).map(|fields| ExternalRecord {
            id,
            fields: fields.clone(),
        }))
    }

    fn event_types(&self) -> Result<Vec<EventType>, ClientError> {
        Ok(self.event_types.clone())
    }
}
