//! Per-device switch state store.
//!
//! Holds on/off + level for the four components of one device. The level is
//! kept independently of the on/off flag, so toggling never resets it.
//!
//! Implements change detection with a version counter that is incremented
//! each time a component actually changes.

use super::ComponentName;
use serde::{Deserialize, Serialize};

/// Level a component starts at before any state is known.
pub const DEFAULT_LEVEL: u8 = 100;

/// Highest valid level.
pub const MAX_LEVEL: u8 = 100;

/// State of one switch component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchComponent {
    pub is_on: bool,
    pub level: u8,
}

impl Default for SwitchComponent {
    fn default() -> Self {
        Self {
            is_on: false,
            level: DEFAULT_LEVEL,
        }
    }
}

/// A single mutation applied to one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    OnOff(bool),
    Level(u8),
}

/// On/off + level state for all components of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchStateStore {
    components: [SwitchComponent; 4],
    version: u32,
}

impl SwitchStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: ComponentName) -> SwitchComponent {
        self.components[name.slot()]
    }

    pub fn is_on(&self, name: ComponentName) -> bool {
        self.get(name).is_on
    }

    pub fn level(&self, name: ComponentName) -> u8 {
        self.get(name).level
    }

    /// Apply a change. Returns true (and bumps the version) if the value changed.
    ///
    /// Levels above [`MAX_LEVEL`] are clamped.
    pub fn apply(&mut self, name: ComponentName, change: StateChange) -> bool {
        let slot = &mut self.components[name.slot()];
        let before = *slot;
        match change {
            StateChange::OnOff(on) => slot.is_on = on,
            StateChange::Level(level) => slot.level = level.min(MAX_LEVEL),
        }
        let changed = *slot != before;
        if changed {
            self.version = self.version.wrapping_add(1);
        }
        changed
    }

    /// Replace every component with `other`'s state.
    pub fn copy_from(&mut self, other: &SwitchStateStore) -> bool {
        let mut changed = false;
        for name in ComponentName::ALL {
            let src = other.get(name);
            changed |= self.apply(name, StateChange::OnOff(src.is_on));
            changed |= self.apply(name, StateChange::Level(src.level));
        }
        changed
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}
