//! Sync engine: host and CRM callbacks wired to the store and reconciler.
//!
//! One engine serves one request. It owns both collaborators, the loaded
//! correspondence store and the request context, and commits the store at the
//! end of every callback that changed it.

use recurlink_core::types::{ExternalId, OccurrenceId, SequenceId, SharedFields};

use crate::context::RequestContext;
use crate::correspondence::CorrespondenceStore;
use crate::error::SyncError;
use crate::listeners::Listener;
use crate::ports::{ExternalRecordClient, SequenceProvider};
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::sequence_break::{after_break, before_break};

/// What happened to the record of a removed occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRetirement {
    Disabled(ExternalId),
    Deleted(ExternalId),
    /// The CRM call failed; the record is kept as an orphan of the sequence.
    Failed(ExternalId),
}

pub struct SyncEngine<P, C> {
    provider: P,
    client: C,
    store: CorrespondenceStore,
    context: RequestContext,
}

impl<P: SequenceProvider, C: ExternalRecordClient> SyncEngine<P, C> {
    pub fn new(provider: P, client: C, store: CorrespondenceStore, context: RequestContext) -> Self {
        Self {
            provider,
            client,
            store,
            context,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn into_parts(self) -> (P, C, CorrespondenceStore) {
        (self.provider, self.client, self.store)
    }

    /// Reconcile one sequence against the CRM and commit the result.
    pub fn sync_sequence(&mut self, sequence: SequenceId) -> Result<ReconcileOutcome, SyncError> {
        let mut dates = self
            .provider
            .occurrences(sequence)?
            .ok_or(SyncError::SequenceNotFound(sequence))?;
        let shared = self
            .provider
            .shared_fields(sequence)?
            .ok_or(SyncError::SequenceNotFound(sequence))?;
        dates.sort_by_key(|d| d.start);

        let outcome = Reconciler::new(&mut self.client, &mut self.context).reconcile(
            &mut self.store,
            sequence,
            &dates,
            &shared,
        )?;
        self.store.commit()?;
        Ok(outcome)
    }

    /// Host callback: a sequence was saved.
    ///
    /// Returns `None` when the "sequence saved" listener is suspended.
    pub fn on_sequence_saved(
        &mut self,
        sequence: SequenceId,
    ) -> Result<Option<ReconcileOutcome>, SyncError> {
        if !self.context.listeners.is_active(Listener::SequenceSaved) {
            tracing::debug!("sequence {sequence}: save listener suspended, skipping");
            return Ok(None);
        }
        self.sync_sequence(sequence).map(Some)
    }

    /// Host callback: one occurrence was deleted.
    ///
    /// The record is disabled, or deleted when `delete_unused` is set, and
    /// its correspondence dropped. If the CRM call fails the record becomes
    /// an orphan instead. Returns `None` if the occurrence was never synced.
    pub fn on_occurrence_deleted(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
    ) -> Result<Option<RecordRetirement>, SyncError> {
        let Some(external) = self.store.forward(sequence).get(&occurrence).copied() else {
            tracing::debug!("sequence {sequence}: occurrence {occurrence} was never synced");
            return Ok(None);
        };
        if !self.client.is_available() {
            return Err(SyncError::ClientUnavailable);
        }

        let retirement = {
            let _quiet = self.context.listeners.suspend(Listener::RecordChanged);
            if self.context.options.delete_unused {
                match self.client.delete(external) {
                    Ok(()) => RecordRetirement::Deleted(external),
                    Err(err) => {
                        tracing::error!("sequence {sequence}: delete of record {external} failed: {err}");
                        RecordRetirement::Failed(external)
                    }
                }
            } else {
                match self.client.disable(external) {
                    Ok(()) => RecordRetirement::Disabled(external),
                    Err(err) => {
                        tracing::error!("sequence {sequence}: disable of record {external} failed: {err}");
                        RecordRetirement::Failed(external)
                    }
                }
            }
        };
        // A record the CRM still holds stays reachable as an orphan.
        match retirement {
            RecordRetirement::Failed(_) => self.store.orphan_one(sequence, occurrence, external),
            RecordRetirement::Disabled(_) | RecordRetirement::Deleted(_) => {
                self.store.clear_one(sequence, occurrence, external);
            }
        }
        self.store.commit()?;
        Ok(Some(retirement))
    }

    /// Host callback: one occurrence was hidden from the sequence without
    /// being deleted. Its record is disabled and kept as an orphan so the
    /// occurrence can take it back.
    pub fn on_occurrence_hidden(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
    ) -> Result<Option<ExternalId>, SyncError> {
        let Some(external) = self.store.forward(sequence).get(&occurrence).copied() else {
            return Ok(None);
        };
        if !self.client.is_available() {
            return Err(SyncError::ClientUnavailable);
        }

        self.store.orphan_one(sequence, occurrence, external);
        {
            let _quiet = self.context.listeners.suspend(Listener::RecordChanged);
            if let Err(err) = self.client.disable(external) {
                tracing::error!("sequence {sequence}: disable of record {external} failed: {err}");
            }
        }
        self.store.commit()?;
        Ok(Some(external))
    }

    /// Host callback: a whole sequence was deleted. Records stay in the CRM.
    pub fn on_sequence_deleted(&mut self, sequence: SequenceId) -> Result<usize, SyncError> {
        let removed = self.store.clear_all(sequence);
        self.store.commit()?;
        tracing::info!("sequence {sequence}: dropped {removed} correspondence rows");
        Ok(removed)
    }

    /// CRM callback: a record was edited in the CRM.
    ///
    /// Its shared fields are pulled into the owning sequence and pushed back
    /// out to every sibling record. Returns `None` when the listener is
    /// suspended, or the record is unknown or gone.
    pub fn on_record_changed(
        &mut self,
        external: ExternalId,
    ) -> Result<Option<ReconcileOutcome>, SyncError> {
        if !self.context.listeners.is_active(Listener::RecordChanged) {
            tracing::debug!("record {external}: change listener suspended, skipping");
            return Ok(None);
        }
        let Some((sequence, _)) = self.store.reverse(external) else {
            tracing::debug!("record {external}: not linked to any occurrence");
            return Ok(None);
        };
        let Some(record) = self.client.get(external)? else {
            tracing::warn!("record {external}: reported changed but no longer exists");
            return Ok(None);
        };

        let fields = SharedFields::from_record(&record.fields);
        {
            let _quiet = self.context.listeners.suspend(Listener::SequenceSaved);
            self.provider.apply_shared_fields(sequence, &fields)?;
        }
        let _quiet = self.context.listeners.suspend(Listener::RecordChanged);
        self.sync_sequence(sequence).map(Some)
    }

    /// Break one occurrence out into a new standalone sequence, carrying its
    /// record along. The correspondence is restored if the host refuses.
    pub fn break_occurrence(
        &mut self,
        sequence: SequenceId,
        occurrence: OccurrenceId,
    ) -> Result<SequenceId, SyncError> {
        let pending = before_break(&mut self.store, sequence, occurrence);
        let new_sequence = match self
            .provider
            .break_occurrence(sequence, occurrence, pending.skipped_fields())
        {
            Ok(id) => id,
            Err(err) => {
                pending.abort(&mut self.store);
                return Err(err.into());
            }
        };
        after_break(&mut self.store, pending, new_sequence);
        self.store.commit()?;
        Ok(new_sequence)
    }

    /// Drop every correspondence of every sequence.
    pub fn purge_all(&mut self) -> Result<usize, SyncError> {
        let removed = self.store.purge_all();
        self.store.commit()?;
        tracing::info!("purged {removed} correspondence rows");
        Ok(removed)
    }
}
