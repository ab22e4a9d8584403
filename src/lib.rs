//! Scene switch sync engine.
//!
//! Turns raw scene-controller events from four-button wall switches into
//! debounced toggles, dimming ramps and LED updates, and keeps every
//! sync-enabled switch in the same state. The MQTT input bridges the engine
//! to a protocol gateway.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod input;
pub mod instance_lock;
pub mod store;
