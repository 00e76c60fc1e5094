//! On-disk copy of the last good fleet snapshot.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};
use crate::model::{FleetSnapshot, InstanceRecord, InstanceState};

pub const CACHE_FILE_NAME: &str = "instances_cache.json";

/// Accepts both the current document and the older bare list of records.
#[derive(Deserialize)]
#[serde(untagged)]
enum CacheDocument {
    Snapshot(FleetSnapshot),
    Legacy(Vec<InstanceRecord>),
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CACHE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails; returns whether the snapshot reached disk.
    pub fn save(&self, snapshot: &FleetSnapshot) -> bool {
        match self.try_save(snapshot) {
            Ok(()) => {
                debug!(
                    path = %self.path.display(),
                    instance_count = snapshot.len(),
                    "Fleet snapshot cached"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to save fleet snapshot cache");
                false
            }
        }
    }

    /// Never fails; a missing or unreadable cache yields an empty snapshot.
    pub fn load(&self) -> FleetSnapshot {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No fleet snapshot cache found");
            return FleetSnapshot::default();
        }

        match self.try_load() {
            Ok(snapshot) => {
                info!(
                    path = %self.path.display(),
                    instance_count = snapshot.len(),
                    scanned_at = ?snapshot.scanned_at,
                    "Loaded cached fleet snapshot"
                );
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Failed to load fleet snapshot cache, starting empty");
                FleetSnapshot::default()
            }
        }
    }

    fn try_save(&self, snapshot: &FleetSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| self.io_error(e.into()))?;
        write_atomic(&self.path, &json).map_err(|e| self.io_error(e))
    }

    fn try_load(&self) -> Result<FleetSnapshot> {
        let bytes = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        let document: CacheDocument =
            serde_json::from_slice(&bytes).map_err(|e| self.io_error(e.into()))?;

        let mut snapshot = match document {
            CacheDocument::Snapshot(snapshot) => snapshot,
            CacheDocument::Legacy(instances) => FleetSnapshot {
                scanned_at: None,
                instances,
            },
        };

        // Older caches were written after the rebooting override. No watch
        // survives a restart, so the synthetic state must not either.
        for instance in snapshot.instances.iter_mut() {
            if instance.state == InstanceState::Rebooting {
                debug!(instance_id = %instance.id, "Dropping cached rebooting state");
                instance.state = InstanceState::Unknown;
            }
        }

        Ok(snapshot)
    }

    fn io_error(&self, source: std::io::Error) -> FleetError {
        FleetError::CacheIo {
            path: self.path.clone(),
            source,
        }
    }
}

/// Writes through a sibling temp file so readers never see a torn document.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
