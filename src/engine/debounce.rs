//! Scene activation debouncing.
//!
//! The wall switch reports every press several times (and may report a
//! button either as scene `b` or `b + 4` depending on its indicator state).
//! Repeats of the same logical button inside the debounce window are folded
//! into one press.

use crate::device::BUTTON_COUNT;
use crate::error::{Result, SwitchError};
use std::time::{Duration, Instant};

/// Repeats of the same button within this window are duplicates.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Highest scene id the device reports.
pub const MAX_SCENE_ID: u8 = BUTTON_COUNT * 2;

/// Map a raw scene id (1-8) onto its logical button (1-4).
pub fn normalize_scene(scene_id: u8) -> Result<u8> {
    match scene_id {
        1..=BUTTON_COUNT => Ok(scene_id),
        5..=MAX_SCENE_ID => Ok(scene_id - BUTTON_COUNT),
        _ => Err(SwitchError::InvalidSceneId(scene_id)),
    }
}

/// Per-device debounce history.
#[derive(Debug, Clone, Default)]
pub struct DebounceState {
    last_button_index: Option<u8>,
    last_event: Option<Instant>,
}

impl DebounceState {
    /// State restored after a restart: the button is known, the timestamp is not.
    pub fn restored(last_button_index: Option<u8>) -> Self {
        Self {
            last_button_index,
            last_event: None,
        }
    }

    pub fn last_button_index(&self) -> Option<u8> {
        self.last_button_index
    }

    /// Record a press of `button` at `now`.
    ///
    /// Returns false, leaving the state untouched, when it repeats the last
    /// button inside `window`.
    pub fn accept(&mut self, button: u8, now: Instant, window: Duration) -> bool {
        if self.is_duplicate(button, now, window) {
            return false;
        }
        self.last_button_index = Some(button);
        self.last_event = Some(now);
        true
    }

    fn is_duplicate(&self, button: u8, now: Instant, window: Duration) -> bool {
        match (self.last_button_index, self.last_event) {
            (Some(last), Some(at)) if last == button => {
                now.saturating_duration_since(at) < window
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_scene() {
        for raw in 1..=4 {
            assert_eq!(normalize_scene(raw).unwrap(), raw);
            assert_eq!(normalize_scene(raw + 4).unwrap(), raw);
        }
        assert!(matches!(normalize_scene(0), Err(SwitchError::InvalidSceneId(0))));
        assert!(matches!(normalize_scene(9), Err(SwitchError::InvalidSceneId(9))));
    }

    #[test]
    fn test_first_event_is_never_duplicate() {
        let mut state = DebounceState::default();
        assert!(state.accept(1, Instant::now(), DEBOUNCE_WINDOW));
        assert_eq!(state.last_button_index(), Some(1));
    }

    #[test]
    fn test_repeat_inside_window_is_dropped() {
        let t0 = Instant::now();
        let mut state = DebounceState::default();
        assert!(state.accept(2, t0, DEBOUNCE_WINDOW));
        assert!(!state.accept(2, t0 + Duration::from_millis(1999), DEBOUNCE_WINDOW));
        // A dropped duplicate does not extend the window
        assert!(state.accept(2, t0 + Duration::from_secs(2), DEBOUNCE_WINDOW));
    }

    #[test]
    fn test_other_button_inside_window_is_accepted() {
        let t0 = Instant::now();
        let mut state = DebounceState::default();
        assert!(state.accept(1, t0, DEBOUNCE_WINDOW));
        assert!(state.accept(3, t0 + Duration::from_millis(100), DEBOUNCE_WINDOW));
        assert!(state.accept(1, t0 + Duration::from_millis(200), DEBOUNCE_WINDOW));
    }

    #[test]
    fn test_restored_state_has_no_window() {
        let mut state = DebounceState::restored(Some(4));
        assert_eq!(state.last_button_index(), Some(4));
        assert!(state.accept(4, Instant::now(), DEBOUNCE_WINDOW));
    }
}
