//! In-memory zone store and JSON zone files.
//!
//! [`MemoryZoneStore`] is the reference [`ZoneStore`]: a map of zones behind a
//! lock plus a broadcast channel that carries a [`ZoneSnapshot`] after every
//! change. The server preloads it from a JSON file with [`load_zones`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::services::{ZoneChange, ZoneSnapshot, ZoneStore};
use crate::zone::Zone;

const CHANNEL_CAPACITY: usize = 64;

/// Errors writing zone state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneStoreError {
    /// No zone with this identifier exists.
    #[error("zone {0} not found")]
    NotFound(String),

    /// The write transaction failed.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Zones held in memory, observable through [`ZoneStore::subscribe`].
#[derive(Debug)]
pub struct MemoryZoneStore {
    zones: RwLock<BTreeMap<String, Zone>>,
    changes: broadcast::Sender<ZoneSnapshot>,
}

impl MemoryZoneStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            zones: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    /// Create a store holding `zones`. No notification is sent.
    #[must_use]
    pub fn with_zones(zones: impl IntoIterator<Item = Zone>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.zones.write() {
            map.extend(zones.into_iter().map(|zone| (zone.id.clone(), zone)));
        }
        store
    }

    /// Insert or replace a zone and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneStoreError::WriteFailed`] if the store lock is poisoned.
    pub fn upsert(&self, zone: Zone) -> Result<ZoneChange, ZoneStoreError> {
        let change = {
            let mut zones = self.write()?;
            let id = zone.id.clone();
            match zones.insert(id.clone(), zone) {
                Some(_) => ZoneChange::Updated(id),
                None => ZoneChange::Inserted(id),
            }
        };
        self.notify(change.clone());
        Ok(change)
    }

    /// Remove a zone and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneStoreError::NotFound`] if no such zone exists.
    pub fn remove(&self, id: &str) -> Result<Zone, ZoneStoreError> {
        let removed = self
            .write()?
            .remove(id)
            .ok_or_else(|| ZoneStoreError::NotFound(id.to_string()))?;
        self.notify(ZoneChange::Deleted(id.to_string()));
        Ok(removed)
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Zone>>, ZoneStoreError> {
        self.zones
            .write()
            .map_err(|_| ZoneStoreError::WriteFailed("zone store lock poisoned".into()))
    }

    fn notify(&self, change: ZoneChange) {
        let snapshot = ZoneSnapshot {
            zones: self.tracking_zones(),
            change,
        };
        // no receivers is fine, nobody is watching yet
        let _ = self.changes.send(snapshot);
    }
}

impl Default for MemoryZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneStore for MemoryZoneStore {
    fn zones(&self) -> Vec<Zone> {
        self.zones
            .read()
            .map(|zones| zones.values().cloned().collect())
            .unwrap_or_default()
    }

    fn zone(&self, id: &str) -> Option<Zone> {
        self.zones.read().ok().and_then(|zones| zones.get(id).cloned())
    }

    fn set_in_region(&self, id: &str, in_region: bool) -> Result<(), ZoneStoreError> {
        {
            let mut zones = self.write()?;
            let zone = zones
                .get_mut(id)
                .ok_or_else(|| ZoneStoreError::NotFound(id.to_string()))?;
            if zone.in_region == in_region {
                return Ok(());
            }
            zone.in_region = in_region;
        }
        tracing::debug!(zone = %id, in_region, "zone membership updated");
        self.notify(ZoneChange::Updated(id.to_string()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ZoneSnapshot> {
        self.changes.subscribe()
    }
}

// =============================================================================
// ZONE FILES
// =============================================================================

/// Errors reading or writing a zone file.
#[derive(Debug, Error)]
pub enum ZoneFileError {
    /// The file could not be read.
    #[error("Failed to read zones from {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Failed to write zones to {}: {source}", path.display())]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON list of zones.
    #[error("Failed to parse zones: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Load a JSON list of zones. A missing file yields no zones.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_zones(path: &Path) -> Result<Vec<Zone>, ZoneFileError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ZoneFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Save zones as a pretty-printed JSON list, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_zones(path: &Path, zones: &[Zone]) -> Result<(), ZoneFileError> {
    let write_error = |source| ZoneFileError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    let content = serde_json::to_string_pretty(zones)?;
    std::fs::write(path, content).map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    fn home() -> Zone {
        Zone::new("zone.home", Coordinate::new(37.1234, -122.4567), 50.0)
    }

    #[tokio::test]
    async fn test_upsert_notifies_subscribers() {
        let store = MemoryZoneStore::new();
        let mut rx = store.subscribe();

        assert_eq!(store.upsert(home()).unwrap(), ZoneChange::Inserted("zone.home".into()));
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.change, ZoneChange::Inserted("zone.home".into()));
        assert_eq!(snapshot.zones.len(), 1);

        let mut edited = home();
        edited.radius = 75.0;
        assert_eq!(store.upsert(edited).unwrap(), ZoneChange::Updated("zone.home".into()));
    }

    #[tokio::test]
    async fn test_snapshot_only_has_tracking_zones() {
        let store = MemoryZoneStore::new();
        let mut rx = store.subscribe();

        let mut disabled = Zone::new("zone.off", Coordinate::new(1.0, 1.0), 200.0);
        disabled.tracking_enabled = false;
        store.upsert(disabled).unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot.zones.is_empty());
        assert_eq!(store.zones().len(), 1);
        assert!(store.tracking_zones().is_empty());
    }

    #[test]
    fn test_set_in_region() {
        let store = MemoryZoneStore::with_zones([home()]);
        store.set_in_region("zone.home", true).unwrap();
        assert!(store.zone("zone.home").unwrap().in_region);

        assert_eq!(
            store.set_in_region("zone.missing", true),
            Err(ZoneStoreError::NotFound("zone.missing".into()))
        );
    }

    #[test]
    fn test_remove_missing_zone() {
        let store = MemoryZoneStore::new();
        assert!(matches!(store.remove("zone.home"), Err(ZoneStoreError::NotFound(_))));
    }

    #[test]
    fn test_zone_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("zones.json");

        assert!(load_zones(&path).unwrap().is_empty());

        save_zones(&path, &[home()]).unwrap();
        let loaded = load_zones(&path).unwrap();
        assert_eq!(loaded, vec![home()]);
    }

    #[test]
    fn test_zone_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_zones(&path), Err(ZoneFileError::Parse(_))));
    }
}
