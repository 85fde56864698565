//! Collaborator interfaces the reconciler drives.
//!
//! The host content system sits behind [`SequenceProvider`]; the CRM sits
//! behind [`ExternalRecordClient`]. Lookups that find nothing return `None`,
//! never an error.

use recurlink_core::types::{
    EventType, ExternalId, ExternalRecord, OccurrenceDate, OccurrenceId, RecordFields, SequenceId,
    SharedFields,
};

use crate::error::{ClientError, ProviderError};

/// Read and write access to recurring-event sequences in the host system.
pub trait SequenceProvider {
    /// Every sequence id, ascending. Stepped sync paginates over this list.
    fn list_sequences(&self) -> Result<Vec<SequenceId>, ProviderError>;

    /// Current occurrences of a sequence in chronological order.
    fn occurrences(&self, sequence: SequenceId) -> Result<Option<Vec<OccurrenceDate>>, ProviderError>;

    /// Fields shared by every occurrence of a sequence.
    fn shared_fields(&self, sequence: SequenceId) -> Result<Option<SharedFields>, ProviderError>;

    /// Overwrite the shared fields of a sequence (CRM → host direction).
    fn apply_shared_fields(
        &mut self,
        sequence: SequenceId,
        fields: &SharedFields,
    ) -> Result<(), ProviderError>;

    /// Detach one occurrence into a new standalone sequence and return its id.
    ///
    /// The host copies custom fields onto the new sequence; `skip_fields`
    /// names the ones it must leave behind.
    fn break_occurrence(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
        skip_fields: &[&str],
    ) -> Result<SequenceId, ProviderError>;
}

/// Remote CRM event API.
pub trait ExternalRecordClient {
    /// Whether the CRM is reachable and initialized. Checked once before a
    /// reconciliation writes anything.
    fn is_available(&self) -> bool;

    fn create(&mut self, fields: &RecordFields) -> Result<ExternalId, ClientError>;

    fn update(&mut self, id: ExternalId, fields: &RecordFields) -> Result<(), ClientError>;

    /// Soft-disable: the record and its registrations survive.
    fn disable(&mut self, id: ExternalId) -> Result<(), ClientError>;

    fn delete(&mut self, id: ExternalId) -> Result<(), ClientError>;

    fn get(&self, id: ExternalId) -> Result<Option<ExternalRecord>, ClientError>;

    /// Event types the CRM offers.
    fn event_types(&self) -> Result<Vec<EventType>, ClientError>;
}
