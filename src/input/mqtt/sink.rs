//! Outbound publishing of LED, association and state messages.

use crate::device::{ComponentName, DeviceId};
use crate::engine::association::AssociationCommand;
use crate::engine::led::LedCommand;
use crate::engine::{OutboundSink, StateNotification};
use crate::error::Result;
use log::{info, warn};
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LedPayload {
    payload: [u8; 5],
}

#[derive(Debug, Serialize)]
struct AssociationPayload<'a> {
    group: u8,
    nodes: &'a [u8],
}

#[derive(Debug, Serialize)]
struct StatePayload {
    state: &'static str,
    level: u8,
}

pub(super) fn led_topic(prefix: &str, device_id: &DeviceId) -> String {
    format!("{prefix}/{device_id}/led/set")
}

pub(super) fn association_topic(prefix: &str, device_id: &DeviceId) -> String {
    format!("{prefix}/{device_id}/association/set")
}

pub(super) fn state_topic(prefix: &str, device_id: &DeviceId, component: ComponentName) -> String {
    format!("{prefix}/{device_id}/{component}/state")
}

fn led_payload(command: LedCommand) -> Result<String> {
    Ok(serde_json::to_string(&LedPayload {
        payload: command.to_bytes(),
    })?)
}

fn association_payload(command: &AssociationCommand) -> Result<String> {
    Ok(serde_json::to_string(&AssociationPayload {
        group: command.group_id,
        nodes: &command.target_node_ids,
    })?)
}

fn state_payload(notification: &StateNotification) -> Result<String> {
    Ok(serde_json::to_string(&StatePayload {
        state: if notification.is_on { "ON" } else { "OFF" },
        level: notification.level,
    })?)
}

/// Publishes engine output to the gateway.
///
/// Uses `try_publish` so a full request queue surfaces as an error instead
/// of blocking the engine.
pub struct MqttSink {
    client: AsyncClient,
    prefix: String,
}

impl MqttSink {
    pub fn new(client: AsyncClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn publish(&self, topic: String, payload: String, retain: bool) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }
}

impl OutboundSink for MqttSink {
    fn send_led(&mut self, device_id: &DeviceId, command: LedCommand) -> Result<()> {
        let payload = led_payload(command)?;
        self.publish(led_topic(&self.prefix, device_id), payload, false)
    }

    fn send_association(&mut self, command: &AssociationCommand) -> Result<()> {
        let payload = association_payload(command)?;
        self.publish(association_topic(&self.prefix, &command.device_id), payload, false)
    }

    fn notify_state(&mut self, notification: &StateNotification) {
        let topic = state_topic(&self.prefix, &notification.device_id, notification.component);
        let result = state_payload(notification).and_then(|p| self.publish(topic, p, true));
        if let Err(e) = result {
            warn!(
                "[MQTT] Failed to publish {} {} state: {}",
                notification.device_id, notification.component, e
            );
        }
    }
}

/// Sink that only logs, for running without a broker.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl OutboundSink for LoggingSink {
    fn send_led(&mut self, device_id: &DeviceId, command: LedCommand) -> Result<()> {
        info!("[LED] {} -> {:02X?}", device_id, command.to_bytes());
        Ok(())
    }

    fn send_association(&mut self, command: &AssociationCommand) -> Result<()> {
        info!(
            "[Association] {} group {} -> {:?}",
            command.device_id, command.group_id, command.target_node_ids
        );
        Ok(())
    }

    fn notify_state(&mut self, n: &StateNotification) {
        info!(
            "[Sync] {} {} on={} level={}",
            n.device_id, n.component, n.is_on, n.level
        );
    }
}
