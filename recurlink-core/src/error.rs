//! Error types for recurlink-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{OccurrenceId, SequenceId};

/// All errors that can arise from catalog and settings operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.recurlink/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The sequence file did not exist at the expected path.
    #[error("sequence {id} not found at {path}")]
    SequenceNotFound { id: SequenceId, path: PathBuf },

    /// The sequence exists but has no such occurrence.
    #[error("sequence {sequence} has no occurrence {occurrence}")]
    OccurrenceNotFound {
        sequence: SequenceId,
        occurrence: OccurrenceId,
    },
}
