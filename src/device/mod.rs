//! Wall-switch device model.
//!
//! A [`Device`] is one physical four-button scene controller. It owns the
//! on/off + level state of its four virtual switches together with the
//! per-device engine state (debounce history, dimming session and
//! association bookkeeping).

pub mod registry;
pub mod switch_state;

pub use registry::DeviceRegistry;
pub use switch_state::{StateChange, SwitchComponent, SwitchStateStore};

use crate::engine::association::AssociationState;
use crate::engine::debounce::DebounceState;
use crate::engine::dimming::DimmingRamp;
use crate::error::{Result, SwitchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString, FromRepr};

/// Number of logical buttons on a device.
pub const BUTTON_COUNT: u8 = 4;

/// Default dimming ramp duration from 0 to 100 in seconds.
pub const DEFAULT_DIMMING_DURATION_SECS: u32 = 8;

/// Stable device identifier. Also used as the device's MQTT topic segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One of the four named switch components of a device.
///
/// The discriminant is the logical button index (1-4).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComponentName {
    Main = 1,
    Switch2 = 2,
    Switch3 = 3,
    Switch4 = 4,
}

impl ComponentName {
    pub const ALL: [ComponentName; 4] = [
        ComponentName::Main,
        ComponentName::Switch2,
        ComponentName::Switch3,
        ComponentName::Switch4,
    ];

    /// Resolve a logical button index (1-4) to its component.
    pub fn from_button(button: u8) -> Result<Self> {
        Self::from_repr(button).ok_or(SwitchError::InvalidButton(button))
    }

    /// Logical button index (1-4).
    pub fn button(self) -> u8 {
        self as u8
    }

    /// Zero-based slot, used for state arrays and LED bits.
    pub fn slot(self) -> usize {
        usize::from(self.button() - 1)
    }
}

/// Direction of a dimmer hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Already-validated per-device preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Whether this device takes part in the sync group.
    pub sync_enabled: bool,
    /// Seconds for a full 0-100 dimming ramp.
    pub dimming_duration_seconds: u32,
    /// Extra node ids every button group is associated with (besides the hub).
    pub association_targets: Vec<u8>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sync_enabled: false,
            dimming_duration_seconds: DEFAULT_DIMMING_DURATION_SECS,
            association_targets: Vec::new(),
        }
    }
}

impl Preferences {
    /// Dimming duration, never below one second.
    pub fn dimming_duration(&self) -> u32 {
        self.dimming_duration_seconds.max(1)
    }
}

/// One wall-switch device instance.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    preferences: Preferences,
    switches: SwitchStateStore,
    pub(crate) debounce: DebounceState,
    pub(crate) dimming: DimmingRamp,
    pub(crate) associations: AssociationState,
}

impl Device {
    pub fn new(id: DeviceId, preferences: Preferences) -> Self {
        Self {
            id,
            preferences,
            switches: SwitchStateStore::new(),
            debounce: DebounceState::default(),
            dimming: DimmingRamp::default(),
            associations: AssociationState::default(),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn set_preferences(&mut self, preferences: Preferences) {
        self.preferences = preferences;
    }

    pub fn sync_enabled(&self) -> bool {
        self.preferences.sync_enabled
    }

    pub fn switches(&self) -> &SwitchStateStore {
        &self.switches
    }

    pub fn switches_mut(&mut self) -> &mut SwitchStateStore {
        &mut self.switches
    }

    pub fn component(&self, name: ComponentName) -> SwitchComponent {
        self.switches.get(name)
    }

    /// Whether association setup has completed at least once.
    pub fn configured(&self) -> bool {
        self.associations.configured()
    }

    /// Most recently debounced button, if any.
    pub fn last_button_index(&self) -> Option<u8> {
        self.debounce.last_button_index()
    }

    pub fn is_ramping(&self) -> bool {
        self.dimming.is_ramping()
    }
}
