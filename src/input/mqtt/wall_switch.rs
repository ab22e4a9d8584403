//! Wall switch message decoding.
//!
//! Parses the gateway's per-device MQTT messages into engine events:
//!
//! - `<prefix>/<id>/scene`: `{"scene_id": 3}` or a bare `3`
//! - `<prefix>/<id>/dimmer`: `{"action": "start", "direction": "up"}` / `{"action": "stop"}`
//! - `<prefix>/<id>/<component>/set`: `{"state": "ON"}` and/or `{"level": 40}`
//! - `<prefix>/<id>/preferences`: a full preferences object

use crate::device::{ComponentName, DeviceId, Direction, Preferences};
use crate::engine::InboundEvent;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScenePayload {
    Bare(u8),
    Object { scene_id: u8 },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum DimmerPayload {
    Start { direction: Direction },
    Stop,
}

#[derive(Debug, Deserialize)]
struct SetPayload {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    level: Option<u8>,
}

/// Decoder for all configured wall switches.
///
/// Remembers the last preferences seen per device so a preferences message
/// can be reported with both its old and new values.
pub struct WallSwitchDecoder {
    prefix: String,
    preferences: BTreeMap<DeviceId, Preferences>,
}

impl WallSwitchDecoder {
    pub fn new(
        prefix: impl Into<String>,
        devices: impl IntoIterator<Item = (DeviceId, Preferences)>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            preferences: devices.into_iter().collect(),
        }
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.preferences.keys().cloned().collect()
    }

    /// All topics to subscribe to.
    pub fn subscribe_topics(&self) -> Vec<String> {
        self.preferences
            .keys()
            .flat_map(|id| {
                let base = format!("{}/{}", self.prefix, id);
                // One filter per component: a `+/set` wildcard would also
                // match our own led/set and association/set publishes
                [format!("{base}/scene"), format!("{base}/dimmer")]
                    .into_iter()
                    .chain(
                        ComponentName::ALL
                            .into_iter()
                            .map(move |component| format!("{base}/{component}/set")),
                    )
                    .chain([format!("{}/{}/preferences", self.prefix, id)])
            })
            .collect()
    }

    /// Process an incoming MQTT message.
    ///
    /// Returns the events it maps to; empty if the message is not for a known
    /// device or cannot be parsed.
    pub fn decode(&mut self, topic: &str, payload: &str) -> Vec<InboundEvent> {
        let Some(rest) = topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('/'))
        else {
            return Vec::new();
        };
        let parts: Vec<&str> = rest.split('/').collect();
        let device_id = DeviceId::from(parts[0]);
        if !self.preferences.contains_key(&device_id) {
            debug!("[MQTT] Message for unknown device on {}", topic);
            return Vec::new();
        }

        match parts[1..] {
            ["scene"] => self.decode_scene(device_id, payload),
            ["dimmer"] => self.decode_dimmer(device_id, payload),
            ["preferences"] => self.decode_preferences(device_id, payload),
            [component, "set"] => self.decode_set(device_id, component, payload),
            _ => {
                debug!("[MQTT] Ignoring topic {}", topic);
                Vec::new()
            }
        }
    }

    fn decode_scene(&self, device_id: DeviceId, payload: &str) -> Vec<InboundEvent> {
        match serde_json::from_str::<ScenePayload>(payload) {
            Ok(ScenePayload::Bare(scene_id) | ScenePayload::Object { scene_id }) => {
                vec![InboundEvent::SceneActivation {
                    device_id,
                    scene_id,
                }]
            }
            Err(e) => {
                warn!("[MQTT] Failed to parse {} scene: {}", device_id, e);
                Vec::new()
            }
        }
    }

    fn decode_dimmer(&self, device_id: DeviceId, payload: &str) -> Vec<InboundEvent> {
        match serde_json::from_str::<DimmerPayload>(payload) {
            Ok(DimmerPayload::Start { direction }) => vec![InboundEvent::DimmerHoldStart {
                device_id,
                direction,
            }],
            Ok(DimmerPayload::Stop) => vec![InboundEvent::DimmerHoldStop { device_id }],
            Err(e) => {
                warn!("[MQTT] Failed to parse {} dimmer: {}", device_id, e);
                Vec::new()
            }
        }
    }

    fn decode_set(&self, device_id: DeviceId, component: &str, payload: &str) -> Vec<InboundEvent> {
        let component = match component.parse::<ComponentName>() {
            Ok(c) => c,
            Err(_) => {
                warn!("[MQTT] Unknown component {} for {}", component, device_id);
                return Vec::new();
            }
        };
        let set = match serde_json::from_str::<SetPayload>(payload) {
            Ok(set) => set,
            Err(e) => {
                warn!("[MQTT] Failed to parse {} {} set: {}", device_id, component, e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if let Some(level) = set.level {
            events.push(InboundEvent::SetLevel {
                device_id: device_id.clone(),
                component,
                level,
            });
        }
        match set.state.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("ON") => events.push(InboundEvent::SetOn {
                device_id,
                component,
            }),
            Some("OFF") => events.push(InboundEvent::SetOff {
                device_id,
                component,
            }),
            Some(other) => warn!("[MQTT] Unknown state {:?} for {}", other, device_id),
            None => {}
        }
        events
    }

    fn decode_preferences(&mut self, device_id: DeviceId, payload: &str) -> Vec<InboundEvent> {
        let new = match serde_json::from_str::<Preferences>(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("[MQTT] Failed to parse {} preferences: {}", device_id, e);
                return Vec::new();
            }
        };
        let Some(old) = self.preferences.insert(device_id.clone(), new.clone()) else {
            return Vec::new();
        };
        vec![InboundEvent::PreferencesChanged {
            device_id,
            old,
            new,
        }]
    }
}
