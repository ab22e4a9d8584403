//! Persisted per-device engine state.
//!
//! Keeps everything that must survive a restart for a device with the same
//! id: the last debounced button, whether a dimming session was active, the
//! `configured` flag and the association records. Debounce timestamps and
//! dimming timers are never stored; a restarted engine is Idle with no
//! debounce window.

use crate::device::DeviceId;
use crate::engine::association::AssociationRecord;
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted state of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDevice {
    #[serde(default)]
    pub last_button_index: Option<u8>,
    #[serde(default)]
    pub dimming_active: bool,
    #[serde(default)]
    pub configured: bool,
    #[serde(default)]
    pub associations: Vec<AssociationRecord>,
}

/// Persisted state of all devices.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub devices: BTreeMap<DeviceId, PersistedDevice>,
}

impl PersistedState {
    /// Load from file
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) => {
                    info!(
                        "[Store] Loaded state for {} device(s) from {:?}",
                        state.devices.len(),
                        path
                    );
                    state
                }
                Err(e) => {
                    warn!("[Store] Failed to parse state file: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Store] No persisted state found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("[Store] Failed to read state file: {}", e);
                Self::default()
            }
        }
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)
    }
}

/// Store wrapper with auto-save. Without a path it only keeps state in memory.
pub struct StateStore {
    path: Option<PathBuf>,
    state: RwLock<PersistedState>,
}

impl StateStore {
    pub fn open(path: PathBuf) -> Self {
        let mut state = PersistedState::load(&path);
        for (id, device) in state.devices.iter_mut() {
            if device.dimming_active {
                warn!("[Store] {} was dimming at shutdown, restarting Idle", id);
                device.dimming_active = false;
            }
        }
        Self {
            path: Some(path),
            state: RwLock::new(state),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PersistedState::default()),
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<PersistedDevice> {
        self.state.read().devices.get(id).cloned()
    }

    /// Store `device` for `id`, writing the file only when something changed.
    pub fn put(&self, id: &DeviceId, device: PersistedDevice) {
        let mut state = self.state.write();
        if state.devices.get(id) == Some(&device) {
            return;
        }
        state.devices.insert(id.clone(), device);
        self.flush(&state);
    }

    pub fn remove(&self, id: &DeviceId) {
        let mut state = self.state.write();
        if state.devices.remove(id).is_some() {
            self.flush(&state);
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self, state: &PersistedState) {
        if let Some(path) = &self.path
            && let Err(e) = state.save(path)
        {
            error!("[Store] Failed to save state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("scene-switch-sync-{}-{}", name, std::process::id()))
            .join("state.json")
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let store = StateStore::open(temp_path("missing"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);
        let id: DeviceId = "hall".into();
        let record = PersistedDevice {
            last_button_index: Some(3),
            dimming_active: true,
            configured: true,
            associations: vec![AssociationRecord {
                button: 1,
                primary_group: 1,
                alternate_group: 5,
                targets: vec![1],
                programmed_at: Utc::now(),
            }],
        };

        StateStore::open(path.clone()).put(&id, record.clone());

        let reopened = StateStore::open(path.clone());
        let restored = reopened.get(&id).unwrap();
        assert_eq!(restored.last_button_index, Some(3));
        assert!(restored.configured);
        assert_eq!(restored.associations, record.associations);
        // Timers do not survive a restart
        assert!(!restored.dimming_active);

        reopened.remove(&id);
        assert!(StateStore::open(path.clone()).get(&id).is_none());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();
        assert!(StateStore::open(path.clone()).is_empty());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
