//! Dimming ramp state machine.
//!
//! Two states: Idle (no session) and Ramping (one session). The ramp holds
//! no timer itself; an external [`TickScheduler`](super::TickScheduler)
//! delivers ticks tagged with the session id they were armed for, so ticks
//! that outlive their session are recognised and dropped.

use crate::device::{ComponentName, Direction};
use crate::device::switch_state::MAX_LEVEL;

/// Identifies one Idle -> Ramping -> Idle cycle.
pub type SessionId = u64;

/// Level change per tick for a full ramp lasting `duration_secs` ticks.
pub fn step_per_tick(duration_secs: u32, direction: Direction) -> i16 {
    let duration = duration_secs.max(1);
    let magnitude = u32::from(MAX_LEVEL).div_ceil(duration) as i16;
    match direction {
        Direction::Up => magnitude,
        Direction::Down => -magnitude,
    }
}

/// Apply one step to `level`, saturating at 0 and 100.
pub fn next_level(level: u8, step: i16) -> u8 {
    (i16::from(level) + step).clamp(0, i16::from(MAX_LEVEL)) as u8
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimmingSession {
    pub id: SessionId,
    pub target: Option<ComponentName>,
    pub step_per_tick: i16,
}

/// What a tick should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick belongs to a session that has already stopped.
    Stale,
    /// Session is live but has no resolved target button.
    NoTarget,
    Step { target: ComponentName, step: i16 },
}

#[derive(Debug, Default)]
pub struct DimmingRamp {
    session: Option<DimmingSession>,
}

impl DimmingRamp {
    pub fn is_ramping(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&DimmingSession> {
        self.session.as_ref()
    }

    /// Idle -> Ramping under session `id`. Returns false when a session is
    /// already running (the running session is left untouched).
    ///
    /// `id` must never have been used before for any device, so that ticks
    /// from a removed device's timer cannot match a later session.
    pub fn start(
        &mut self,
        id: SessionId,
        direction: Direction,
        duration_secs: u32,
        target: Option<ComponentName>,
    ) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.session = Some(DimmingSession {
            id,
            target,
            step_per_tick: step_per_tick(duration_secs, direction),
        });
        true
    }

    /// Ramping -> Idle. Returns the id of the session that was stopped.
    pub fn stop(&mut self) -> Option<SessionId> {
        self.session.take().map(|s| s.id)
    }

    pub fn tick(&self, session: SessionId) -> TickOutcome {
        match &self.session {
            Some(s) if s.id == session => match s.target {
                Some(target) => TickOutcome::Step {
                    target,
                    step: s.step_per_tick,
                },
                None => TickOutcome::NoTarget,
            },
            _ => TickOutcome::Stale,
        }
    }
}
