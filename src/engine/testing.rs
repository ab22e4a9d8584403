//! Recording test doubles for the engine's outbound seams.

use super::association::AssociationCommand;
use super::dimming::SessionId;
use super::led::LedCommand;
use super::{OutboundSink, StateNotification, TickScheduler};
use crate::device::DeviceId;
use crate::error::{Result, SwitchError};

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub leds: Vec<(DeviceId, LedCommand)>,
    pub associations: Vec<AssociationCommand>,
    pub notifications: Vec<StateNotification>,
    pub reject_leds_for: Option<DeviceId>,
    pub reject_associations: bool,
}

impl RecordingSink {
    pub fn rejecting(id: &str) -> Self {
        Self {
            reject_leds_for: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn last_led(&self, id: &DeviceId) -> Option<LedCommand> {
        self.leds
            .iter()
            .rev()
            .find(|(device, _)| device == id)
            .map(|(_, cmd)| *cmd)
    }

    pub fn leds_for(&self, id: &DeviceId) -> usize {
        self.leds.iter().filter(|(device, _)| device == id).count()
    }
}

impl OutboundSink for RecordingSink {
    fn send_led(&mut self, device_id: &DeviceId, command: LedCommand) -> Result<()> {
        if self.reject_leds_for.as_ref() == Some(device_id) {
            return Err(SwitchError::SinkRejected {
                device: device_id.clone(),
                reason: "offline".into(),
            });
        }
        self.leds.push((device_id.clone(), command));
        Ok(())
    }

    fn send_association(&mut self, command: &AssociationCommand) -> Result<()> {
        if self.reject_associations {
            return Err(SwitchError::SinkRejected {
                device: command.device_id.clone(),
                reason: "association refused".into(),
            });
        }
        self.associations.push(command.clone());
        Ok(())
    }

    fn notify_state(&mut self, notification: &StateNotification) {
        self.notifications.push(notification.clone());
    }
}

#[derive(Debug, Default)]
pub struct RecordingScheduler {
    pub started: Vec<(DeviceId, SessionId)>,
    pub cancelled: Vec<DeviceId>,
    pub pumps: usize,
}

impl RecordingScheduler {
    pub fn last_session(&self, id: &DeviceId) -> Option<SessionId> {
        self.started
            .iter()
            .rev()
            .find(|(device, _)| device == id)
            .map(|(_, session)| *session)
    }
}

impl TickScheduler for RecordingScheduler {
    fn start_ticks(&mut self, device_id: &DeviceId, session: SessionId) {
        self.started.push((device_id.clone(), session));
    }

    fn cancel_ticks(&mut self, device_id: &DeviceId) {
        self.cancelled.push(device_id.clone());
    }

    fn schedule_association_pump(&mut self) {
        self.pumps += 1;
    }
}
