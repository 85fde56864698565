//! Date-matching reconciler.
//!
//! Brings the CRM records of one sequence in line with its current
//! occurrences. Three paths, chosen by comparing the occurrence count with
//! the number of live correspondences:
//!
//! 1. **First sync**, nothing recorded yet: one new record per occurrence.
//! 2. **Positional**, same count: the Nth occurrence (chronological) takes
//!    the Nth recorded record (occurrence-key order), whatever its date. An
//!    unchanged length is taken to mean the rule was not structurally edited.
//! 3. **Date matched**, counts differ: occurrences claim live records whose
//!    start is exactly equal, then orphans of the sequence the same way. The
//!    scan runs in stored order and the first unclaimed hit wins. Leftover
//!    occurrences get new records; leftover live records are disabled and
//!    orphaned, or deleted when `delete_unused` is set.
//!
//! A failing CRM call is logged, recorded in [`ReconcileOutcome::failures`]
//! and skipped; the run continues with the next item. The one exception is
//! a live record that cannot be fetched on the date-matched path: the run
//! stops before its first write.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;

use recurlink_core::types::{
    ExternalId, ExternalRecord, OccurrenceDate, OccurrenceId, RecordFields, SequenceId,
    SharedFields,
};

use crate::context::RequestContext;
use crate::correspondence::CorrespondenceStore;
use crate::error::{ClientError, SyncError};
use crate::listeners::Listener;
use crate::ports::ExternalRecordClient;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Which path a reconciliation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    Noop,
    FirstSync,
    Positional,
    DateMatched,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::Noop => write!(f, "no-op"),
            ReconcileMode::FirstSync => write!(f, "first sync"),
            ReconcileMode::Positional => write!(f, "positional"),
            ReconcileMode::DateMatched => write!(f, "date matched"),
        }
    }
}

/// CRM call kinds, for failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Disable,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Fetch => "fetch",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Disable => "disable",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One skipped CRM call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<OccurrenceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalId>,
    pub message: String,
}

/// What a reconciliation did and the state it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub sequence: SequenceId,
    pub mode: ReconcileMode,
    /// Live map after the run.
    pub correspondences: BTreeMap<OccurrenceId, ExternalId>,
    /// Orphan set after the run.
    pub orphans: BTreeSet<ExternalId>,
    pub created: Vec<ExternalId>,
    pub updated: Vec<ExternalId>,
    pub unorphaned: Vec<ExternalId>,
    pub disabled: Vec<ExternalId>,
    pub deleted: Vec<ExternalId>,
    pub failures: Vec<ItemFailure>,
}

impl ReconcileOutcome {
    fn new(sequence: SequenceId, mode: ReconcileMode) -> Self {
        Self {
            sequence,
            mode,
            correspondences: BTreeMap::new(),
            orphans: BTreeSet::new(),
            created: Vec::new(),
            updated: Vec::new(),
            unorphaned: Vec::new(),
            disabled: Vec::new(),
            deleted: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(
        &mut self,
        operation: Operation,
        occurrence: Option<OccurrenceId>,
        external: Option<ExternalId>,
        err: &ClientError,
    ) {
        tracing::error!(
            "sequence {}: {operation} failed (occurrence {}, record {}): {err}",
            self.sequence,
            display_opt(occurrence),
            display_opt(external),
        );
        self.failures.push(ItemFailure {
            operation,
            occurrence,
            external,
            message: err.to_string(),
        });
    }
}

fn display_opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a, C> {
    client: &'a mut C,
    context: &'a mut RequestContext,
}

impl<'a, C: ExternalRecordClient> Reconciler<'a, C> {
    pub fn new(client: &'a mut C, context: &'a mut RequestContext) -> Self {
        Self { client, context }
    }

    /// Reconcile one sequence and stage the resulting live map and orphan set
    /// in `store`. The caller commits the store.
    ///
    /// `dates` must be chronological. Returns
    /// [`SyncError::ClientUnavailable`] without touching anything when the
    /// CRM is not reachable, and [`SyncError::Client`], also before any
    /// write, when a live record cannot be fetched for date matching.
    pub fn reconcile(
        &mut self,
        store: &mut CorrespondenceStore,
        sequence: SequenceId,
        dates: &[OccurrenceDate],
        shared: &SharedFields,
    ) -> Result<ReconcileOutcome, SyncError> {
        if !self.client.is_available() {
            tracing::warn!("sequence {sequence}: external record system unavailable");
            return Err(SyncError::ClientUnavailable);
        }

        let existing = store.forward(sequence);
        if existing.is_empty() && dates.is_empty() {
            tracing::warn!("sequence {sequence}: no occurrences to sync");
            let mut outcome = ReconcileOutcome::new(sequence, ReconcileMode::Noop);
            outcome.orphans = store.orphans(sequence);
            return Ok(outcome);
        }

        let shared = SharedFields {
            event_type: self.resolve_event_type(shared.event_type),
            ..shared.clone()
        };

        let outcome = if existing.is_empty() {
            let mut outcome = self.first_sync(sequence, dates, &shared);
            outcome.orphans = store.orphans(sequence);
            outcome
        } else if dates.len() == existing.len() {
            let mut outcome = self.positional(sequence, dates, &existing, &shared);
            outcome.orphans = store.orphans(sequence);
            outcome
        } else {
            let orphans = store.orphans(sequence);
            self.match_by_date(sequence, dates, &existing, &orphans, &shared)?
        };

        debug_assert!(outcome.correspondences.len() <= dates.len());
        store.replace_sequence(
            sequence,
            outcome.correspondences.clone(),
            outcome.orphans.clone(),
        );

        tracing::info!(
            "sequence {sequence}: {} ({} created, {} updated, {} unorphaned, {} disabled, {} deleted, {} failed)",
            outcome.mode,
            outcome.created.len(),
            outcome.updated.len(),
            outcome.unorphaned.len(),
            outcome.disabled.len(),
            outcome.deleted.len(),
            outcome.failures.len(),
        );
        Ok(outcome)
    }

    fn first_sync(
        &mut self,
        sequence: SequenceId,
        dates: &[OccurrenceDate],
        shared: &SharedFields,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(sequence, ReconcileMode::FirstSync);
        for date in dates {
            self.create(&mut outcome, date, shared);
        }
        outcome
    }

    fn positional(
        &mut self,
        sequence: SequenceId,
        dates: &[OccurrenceDate],
        existing: &BTreeMap<OccurrenceId, ExternalId>,
        shared: &SharedFields,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(sequence, ReconcileMode::Positional);
        for (date, &external) in dates.iter().zip(existing.values()) {
            self.update(&mut outcome, date, external, shared);
        }
        outcome
    }

    fn match_by_date(
        &mut self,
        sequence: SequenceId,
        dates: &[OccurrenceDate],
        existing: &BTreeMap<OccurrenceId, ExternalId>,
        orphans_prev: &BTreeSet<ExternalId>,
        shared: &SharedFields,
    ) -> Result<ReconcileOutcome, SyncError> {
        let mut outcome = ReconcileOutcome::new(sequence, ReconcileMode::DateMatched);
        let mut orphans_next = BTreeSet::new();

        // An unreadable live record aborts the run before any write: its
        // occurrence would otherwise get a second active record.
        let live = self.fetch_live(sequence, existing.values().copied())?;
        // Unreadable orphans stay orphans; records the CRM no longer has are
        // dropped.
        let orphaned = self.fetch_all(&mut outcome, orphans_prev.iter().copied(), &mut orphans_next);

        let mut claimed: HashSet<ExternalId> = HashSet::new();
        let mut matched: BTreeMap<OccurrenceId, ExternalId> = BTreeMap::new();
        let mut unorphaned: BTreeSet<ExternalId> = BTreeSet::new();

        let mut unresolved = Vec::new();
        for date in dates {
            match first_unclaimed(&live, &claimed, date) {
                Some(id) => {
                    claimed.insert(id);
                    matched.insert(date.occurrence_id, id);
                }
                None => unresolved.push(date),
            }
        }

        let mut unclaimed_dates = Vec::new();
        for date in unresolved {
            match first_unclaimed(&orphaned, &claimed, date) {
                Some(id) => {
                    claimed.insert(id);
                    unorphaned.insert(id);
                    matched.insert(date.occurrence_id, id);
                }
                None => unclaimed_dates.push(date),
            }
        }

        let unclaimed_records: Vec<ExternalId> = live
            .iter()
            .map(|r| r.id)
            .filter(|id| !claimed.contains(id))
            .collect();

        orphans_next.extend(
            orphaned
                .iter()
                .map(|r| r.id)
                .filter(|id| !unorphaned.contains(id)),
        );

        // (i) matched records take the current shared fields and their date.
        for date in dates {
            if let Some(&external) = matched.get(&date.occurrence_id) {
                self.update(&mut outcome, date, external, shared);
                if unorphaned.contains(&external) {
                    outcome.unorphaned.push(external);
                }
            }
        }

        // (ii) occurrences nobody claimed get new records.
        for date in unclaimed_dates {
            self.create(&mut outcome, date, shared);
        }

        // (iii) records nobody claimed.
        for external in unclaimed_records {
            if self.context.options.delete_unused {
                match self.guarded(|c| c.delete(external)) {
                    Ok(()) => outcome.deleted.push(external),
                    Err(err) => {
                        outcome.fail(Operation::Delete, None, Some(external), &err);
                        orphans_next.insert(external);
                    }
                }
            } else {
                match self.guarded(|c| c.disable(external)) {
                    Ok(()) => outcome.disabled.push(external),
                    Err(err) => outcome.fail(Operation::Disable, None, Some(external), &err),
                }
                orphans_next.insert(external);
            }
        }

        outcome.orphans = orphans_next;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // CRM calls
    // -----------------------------------------------------------------------

    fn create(&mut self, outcome: &mut ReconcileOutcome, date: &OccurrenceDate, shared: &SharedFields) {
        let fields = RecordFields::for_occurrence(shared, date);
        match self.guarded(|c| c.create(&fields)) {
            Ok(external) => {
                outcome.correspondences.insert(date.occurrence_id, external);
                outcome.created.push(external);
            }
            Err(err) => outcome.fail(Operation::Create, Some(date.occurrence_id), None, &err),
        }
    }

    /// A failed update keeps the correspondence: the record still exists,
    /// it is only stale.
    fn update(
        &mut self,
        outcome: &mut ReconcileOutcome,
        date: &OccurrenceDate,
        external: ExternalId,
        shared: &SharedFields,
    ) {
        let fields = RecordFields::for_occurrence(shared, date);
        match self.guarded(|c| c.update(external, &fields)) {
            Ok(()) => outcome.updated.push(external),
            Err(err) => outcome.fail(
                Operation::Update,
                Some(date.occurrence_id),
                Some(external),
                &err,
            ),
        }
        outcome.correspondences.insert(date.occurrence_id, external);
    }

    /// Fetch every live record of a sequence. A record the CRM no longer has
    /// is skipped; any other failure is returned.
    fn fetch_live(
        &mut self,
        sequence: SequenceId,
        ids: impl Iterator<Item = ExternalId>,
    ) -> Result<Vec<ExternalRecord>, SyncError> {
        let mut records = Vec::new();
        for id in ids {
            match self.client.get(id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    tracing::warn!("sequence {sequence}: record {id} no longer exists, dropping it");
                }
                Err(err) => {
                    tracing::error!(
                        "sequence {sequence}: could not fetch live record {id}, nothing written: {err}"
                    );
                    return Err(err.into());
                }
            }
        }
        Ok(records)
    }

    fn fetch_all(
        &mut self,
        outcome: &mut ReconcileOutcome,
        ids: impl Iterator<Item = ExternalId>,
        unreadable: &mut BTreeSet<ExternalId>,
    ) -> Vec<ExternalRecord> {
        let mut records = Vec::new();
        for id in ids {
            match self.client.get(id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    tracing::warn!(
                        "sequence {}: record {id} no longer exists, dropping it",
                        outcome.sequence
                    );
                }
                Err(err) => {
                    outcome.fail(Operation::Fetch, None, Some(id), &err);
                    unreadable.insert(id);
                }
            }
        }
        records
    }

    /// Run one outbound write with the "record changed" listener suspended.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut C) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let _quiet = self.context.listeners.suspend(Listener::RecordChanged);
        op(&mut *self.client)
    }

    fn resolve_event_type(&mut self, requested: Option<u64>) -> Option<u64> {
        let fallback = self.context.options.default_event_type;
        let offered = self.context.cache.event_types(&*self.client);
        if offered.is_empty() {
            return requested.or(fallback);
        }
        match requested {
            Some(id) if offered.iter().any(|t| t.id == id) => Some(id),
            _ => fallback.or_else(|| offered.first().map(|t| t.id)),
        }
    }
}

/// First record in stored order whose start equals the occurrence's start
/// and that no other occurrence has claimed.
fn first_unclaimed(
    records: &[ExternalRecord],
    claimed: &HashSet<ExternalId>,
    date: &OccurrenceDate,
) -> Option<ExternalId> {
    records
        .iter()
        .find(|r| r.fields.start == date.start && !claimed.contains(&r.id))
        .map(|r| r.id)
}
