//! Registry of known devices.
//!
//! Passed by reference to the sync broadcaster instead of living in a global.
//! Devices are kept ordered by id, which is the fixed order any multi-device
//! operation walks them in.

use super::{Device, DeviceId};
use crate::error::{Result, SwitchError};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: Device) -> Result<()> {
        if self.devices.contains_key(device.id()) {
            return Err(SwitchError::DeviceAlreadyRegistered(device.id().clone()));
        }
        self.devices.insert(device.id().clone(), device);
        Ok(())
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<Device> {
        self.devices.remove(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn get(&self, id: &DeviceId) -> Result<&Device> {
        self.devices
            .get(id)
            .ok_or_else(|| SwitchError::UnknownDevice(id.clone()))
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Result<&mut Device> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| SwitchError::UnknownDevice(id.clone()))
    }

    /// Ids of every device whose `sync_enabled` preference is currently on.
    pub fn sync_members(&self) -> Vec<DeviceId> {
        self.devices
            .values()
            .filter(|d| d.sync_enabled())
            .map(|d| d.id().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Preferences;

    fn synced(sync_enabled: bool) -> Preferences {
        Preferences {
            sync_enabled,
            ..Preferences::default()
        }
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut registry = DeviceRegistry::new();
        registry
            .insert(Device::new("a".into(), Preferences::default()))
            .unwrap();
        let err = registry
            .insert(Device::new("a".into(), Preferences::default()))
            .unwrap_err();
        assert!(matches!(err, SwitchError::DeviceAlreadyRegistered(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sync_members_reads_live_preferences() {
        let mut registry = DeviceRegistry::new();
        registry.insert(Device::new("b".into(), synced(true))).unwrap();
        registry.insert(Device::new("a".into(), synced(true))).unwrap();
        registry.insert(Device::new("c".into(), synced(false))).unwrap();

        assert_eq!(
            registry.sync_members(),
            vec![DeviceId::from("a"), DeviceId::from("b")]
        );

        registry
            .get_mut(&"c".into())
            .unwrap()
            .set_preferences(synced(true));
        assert_eq!(registry.sync_members().len(), 3);
    }

    #[test]
    fn test_unknown_device_lookup() {
        let registry = DeviceRegistry::new();
        assert!(matches!(
            registry.get(&"ghost".into()),
            Err(SwitchError::UnknownDevice(_))
        ));
    }
}
