//! # recurlink-sync
//!
//! Correspondence store and date-matching reconciliation between recurring
//! sequences and CRM event records.
//!
//! Build a [`SyncEngine`] from a [`SequenceProvider`], an
//! [`ExternalRecordClient`], a loaded [`CorrespondenceStore`] and a
//! [`RequestContext`], then drive it from host callbacks or
//! [`pipeline::run`].

pub mod context;
pub mod correspondence;
pub mod engine;
pub mod error;
pub mod listeners;
pub mod local;
pub mod memory;
pub mod orphans;
pub mod pipeline;
pub mod ports;
pub mod reconcile;
pub mod sequence_break;
pub mod stepped;

pub use context::{ReconcileOptions, RequestCache, RequestContext};
pub use correspondence::{CorrespondenceStore, Slot};
pub use engine::{RecordRetirement, SyncEngine};
pub use error::{ClientError, ProviderError, SyncError};
pub use listeners::{Listener, ListenerGuard, Listeners};
pub use orphans::OrphanDiff;
pub use ports::{ExternalRecordClient, SequenceProvider};
pub use reconcile::{ItemFailure, Operation, ReconcileMode, ReconcileOutcome, Reconciler};
pub use sequence_break::{after_break, before_break, PendingBreak};
pub use stepped::{step_sequences, StepReport};
