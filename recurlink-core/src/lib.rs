//! recurlink core library: domain types, local catalog, settings, errors.
//!
//! - [`types`]: id newtypes, occurrence dates, shared and record fields
//! - [`error`]: [`CatalogError`]
//! - [`catalog`]: YAML sequence catalog (load / save / break)
//! - [`settings`]: `settings.yaml`

pub mod catalog;
pub mod error;
pub mod settings;
pub mod types;

pub use error::CatalogError;
pub use settings::Settings;
pub use types::{
    EventType, ExternalId, ExternalRecord, OccurrenceDate, OccurrenceId, RecordFields,
    RegistrationSettings, Sequence, SequenceId, SharedFields,
};
