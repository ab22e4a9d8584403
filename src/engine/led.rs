//! LED indicator bitmap encoding.
//!
//! Bit `button - 1` is set exactly when that button's component is on.
//! The bitmap is recomputed from the switch state every time, never cached.

use crate::device::{ComponentName, SwitchStateStore};

/// Command envelope preceding the bitmap byte: manufacturer proprietary
/// class (0x91), manufacturer id 0x001D, indicator-set sub-command (0x0D).
pub const LED_ENVELOPE: [u8; 4] = [0x91, 0x00, 0x1D, 0x0D];

pub fn encode_led_bitmap(switches: &SwitchStateStore) -> u8 {
    ComponentName::ALL
        .iter()
        .filter(|name| switches.is_on(**name))
        .fold(0u8, |bits, name| bits | (1 << name.slot()))
}

pub fn decode_led_bitmap(bitmap: u8) -> [bool; 4] {
    ComponentName::ALL.map(|name| bitmap & (1 << name.slot()) != 0)
}

/// Outbound LED-set command for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCommand {
    bitmap: u8,
}

impl LedCommand {
    pub fn new(bitmap: u8) -> Self {
        Self { bitmap }
    }

    pub fn from_switches(switches: &SwitchStateStore) -> Self {
        Self {
            bitmap: encode_led_bitmap(switches),
        }
    }

    pub fn bitmap(&self) -> u8 {
        self.bitmap
    }

    /// Envelope followed by the bitmap byte.
    pub fn to_bytes(&self) -> [u8; 5] {
        let [a, b, c, d] = LED_ENVELOPE;
        [a, b, c, d, self.bitmap]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StateChange;

    fn store_with(on: [bool; 4]) -> SwitchStateStore {
        let mut store = SwitchStateStore::new();
        for name in ComponentName::ALL {
            store.apply(name, StateChange::OnOff(on[name.slot()]));
        }
        store
    }

    #[test]
    fn test_all_combinations_round_trip() {
        for bits in 0u8..16 {
            let on = [bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0];
            let store = store_with(on);
            let encoded = encode_led_bitmap(&store);
            assert_eq!(encoded, bits);
            assert_eq!(decode_led_bitmap(encoded), on);
        }
    }

    #[test]
    fn test_level_does_not_affect_bitmap() {
        let mut store = store_with([false, true, false, false]);
        store.apply(ComponentName::Main, StateChange::Level(0));
        store.apply(ComponentName::Switch2, StateChange::Level(0));
        assert_eq!(encode_led_bitmap(&store), 0b0010);
    }

    #[test]
    fn test_command_bytes() {
        let store = store_with([true, false, false, true]);
        let cmd = LedCommand::from_switches(&store);
        assert_eq!(cmd.bitmap(), 0b1001);
        assert_eq!(cmd.to_bytes(), [0x91, 0x00, 0x1D, 0x0D, 0b1001]);
    }
}
