//! Error types for recurlink-sync.

use std::path::PathBuf;

use thiserror::Error;

use recurlink_core::error::CatalogError;
use recurlink_core::types::SequenceId;

/// All errors that can arise from sync operations.
///
/// Per-item CRM failures are deliberately absent: those are logged, recorded
/// in the reconcile outcome and skipped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the local sequence catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (stores and ledger).
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The correspondence file changed on disk since it was loaded.
    #[error("correspondence store at {path} was modified concurrently; reload and retry")]
    Conflict { path: PathBuf },

    /// The CRM is not reachable or not initialized. Nothing was written.
    #[error("external record system is unavailable")]
    ClientUnavailable,

    /// A CRM call outside a reconciliation batch failed.
    #[error("external record error: {0}")]
    Client(#[from] ClientError),

    /// The sequence provider failed.
    #[error("sequence provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider does not know the sequence.
    #[error("sequence {0} not found")]
    SequenceNotFound(SequenceId),
}

/// Failure reported by an [`ExternalRecordClient`](crate::ports::ExternalRecordClient) call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct ClientError {
    pub operation: &'static str,
    pub message: String,
}

impl ClientError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Failure reported by a [`SequenceProvider`](crate::ports::SequenceProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Other(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
