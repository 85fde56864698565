//! Global settings at `~/.recurlink/settings.yaml`.
//!
//! A missing file yields [`Settings::default`]. Command-line flags override
//! individual values after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{home, root_at, set_file_permissions};
use crate::error::CatalogError;

/// Batch size used by stepped sync when none is configured.
pub const DEFAULT_STEP_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Hard-delete records that no longer match any occurrence instead of
    /// disabling and orphaning them.
    #[serde(default)]
    pub delete_unused: bool,

    /// Items processed per stepped-sync call.
    #[serde(default = "default_batch_size")]
    pub step_batch_size: usize,

    /// Event type used when a sequence has none, or one the CRM does not offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_event_type: Option<u64>,
}

fn default_batch_size() -> usize {
    DEFAULT_STEP_BATCH_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delete_unused: false,
            step_batch_size: DEFAULT_STEP_BATCH_SIZE,
            default_event_type: None,
        }
    }
}

/// `<home>/.recurlink/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    root_at(home).join("settings.yaml")
}

/// Load settings, falling back to defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<Settings, CatalogError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| CatalogError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, CatalogError> {
    load_at(&home()?)
}

/// Atomically save settings (`.yaml.tmp` + rename).
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), CatalogError> {
    let dir = root_at(home);
    std::fs::create_dir_all(&dir)?;
    let path = settings_path_at(home);
    let tmp = path.with_file_name("settings.yaml.tmp");
    std::fs::write(&tmp, serde_yaml::to_string(settings)?)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let settings = load_at(home.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.delete_unused);
        assert_eq!(settings.step_batch_size, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(root_at(home.path())).unwrap();
        std::fs::write(settings_path_at(home.path()), "delete_unused: true\n").unwrap();
        let settings = load_at(home.path()).unwrap();
        assert!(settings.delete_unused);
        assert_eq!(settings.step_batch_size, DEFAULT_STEP_BATCH_SIZE);
    }

    #[test]
    fn save_then_load() {
        let home = TempDir::new().unwrap();
        let settings = Settings {
            delete_unused: true,
            step_batch_size: 20,
            default_event_type: Some(4),
        };
        save_at(home.path(), &settings).unwrap();
        assert_eq!(load_at(home.path()).unwrap(), settings);
        assert!(!settings_path_at(home.path())
            .with_file_name("settings.yaml.tmp")
            .exists());
    }
}
