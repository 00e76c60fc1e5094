use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cache::write_atomic;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// User preferences persisted next to the snapshot cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "app_language")]
    pub language: String,
    #[serde(alias = "app_dark_mode")]
    pub dark_mode: bool,
    pub pinned_instances: BTreeSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            dark_mode: true,
            pinned_instances: BTreeSet::new(),
        }
    }
}

impl Settings {
    /// Pins or unpins an instance; returns true when it ends up pinned.
    pub fn toggle_pin(&mut self, instance_id: &str) -> bool {
        if self.pinned_instances.remove(instance_id) {
            false
        } else {
            self.pinned_instances.insert(instance_id.to_string());
            true
        }
    }

    pub fn is_pinned(&self, instance_id: &str) -> bool {
        self.pinned_instances.contains(instance_id)
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SETTINGS_FILE_NAME),
        }
    }

    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            return Settings::default();
        }

        let parsed = fs::read(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()));

        match parsed {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load settings, using defaults"
                );
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> bool {
        let written = serde_json::to_vec_pretty(settings)
            .map_err(std::io::Error::from)
            .and_then(|json| write_atomic(&self.path, &json));

        match written {
            Ok(()) => {
                debug!(path = %self.path.display(), "Settings saved");
                true
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to save settings"
                );
                false
            }
        }
    }
}
