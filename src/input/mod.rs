//! Input sources for the switch engine.
//!
//! Each input source turns an external protocol into [`InboundEvent`](crate::engine::InboundEvent)s
//! and provides the matching outbound sink.
//!
//! Current input sources:
//! - `mqtt`: protocol gateway bridged over MQTT

pub mod mqtt;
