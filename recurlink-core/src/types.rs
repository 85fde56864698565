//! Domain types shared by the recurlink crates.
//!
//! Identifiers are `u64` newtypes so a sequence id can never be passed where
//! an external record id is expected. Timestamps are site-local wall-clock
//! `NaiveDateTime`s; start times are compared with exact equality.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a recurring-event definition (a Sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for SequenceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of one Occurrence inside a Sequence.
///
/// Only stable while the sequence's recurrence rule is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceId(pub u64);

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for OccurrenceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Opaque identifier of a CRM event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(pub u64);

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for ExternalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Occurrences
// ---------------------------------------------------------------------------

/// One dated instance of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceDate {
    pub occurrence_id: OccurrenceId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl OccurrenceDate {
    pub fn new(occurrence_id: impl Into<OccurrenceId>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            occurrence_id: occurrence_id.into(),
            start,
            end,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared fields
// ---------------------------------------------------------------------------

/// Online registration settings carried by a sequence and its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegistrationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_role: Option<u64>,
    #[serde(default)]
    pub confirmation_email: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
}

/// Fields a sequence shares with every record it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SharedFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<u64>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub registration: RegistrationSettings,
}

fn default_true() -> bool {
    true
}

impl SharedFields {
    /// Shared fields as seen from a record, used when pulling CRM edits back
    /// into the owning sequence.
    pub fn from_record(fields: &RecordFields) -> Self {
        Self {
            title: fields.title.clone(),
            description: fields.description.clone(),
            summary: fields.summary.clone(),
            location_id: fields.location_id,
            event_type: fields.event_type,
            is_public: fields.is_public,
            registration: fields.registration.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// External records
// ---------------------------------------------------------------------------

/// Payload written to the CRM for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<u64>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub registration: RegistrationSettings,
}

impl RecordFields {
    /// Compose the payload for one occurrence. Pushing always marks the record
    /// active, which is how a matched orphan gets re-enabled.
    pub fn for_occurrence(shared: &SharedFields, date: &OccurrenceDate) -> Self {
        Self {
            title: shared.title.clone(),
            description: shared.description.clone(),
            summary: shared.summary.clone(),
            start: date.start,
            end: date.end,
            location_id: shared.location_id,
            event_type: shared.event_type,
            is_public: shared.is_public,
            is_active: true,
            registration: shared.registration.clone(),
        }
    }
}

/// A record as returned by the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: ExternalId,
    #[serde(flatten)]
    pub fields: RecordFields,
}

/// A CRM event type option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub id: u64,
    pub label: String,
}

// ---------------------------------------------------------------------------
// Local catalog entries
// ---------------------------------------------------------------------------

/// A sequence as stored in the local YAML catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub fields: SharedFields,
    #[serde(default)]
    pub occurrences: Vec<OccurrenceDate>,
    /// Host custom fields. Copied wholesale when an occurrence is broken out.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sequence {
    /// Occurrences in chronological order (start, then occurrence id).
    pub fn sorted_dates(&self) -> Vec<OccurrenceDate> {
        let mut dates = self.occurrences.clone();
        dates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.occurrence_id.cmp(&b.occurrence_id))
        });
        dates
    }

    /// Next unused occurrence id. Occurrence ids are allocated from a
    /// per-sequence counter so a rule edit can renumber every date.
    pub fn next_occurrence_id(&self) -> OccurrenceId {
        let max = self
            .occurrences
            .iter()
            .map(|o| o.occurrence_id.0)
            .max()
            .unwrap_or(0);
        OccurrenceId(max + 1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
