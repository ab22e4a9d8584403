//! MQTT input source for the protocol gateway.
//!
//! This module provides MQTT client functionality to receive decoded wall
//! switch events from the gateway and publish LED, association and state
//! messages back.

mod client;
mod integration;
mod sink;
mod wall_switch;

pub use client::{MqttClient, MqttMessage};
pub use integration::MqttIntegration;
pub use sink::{LoggingSink, MqttSink};
pub use wall_switch::WallSwitchDecoder;
