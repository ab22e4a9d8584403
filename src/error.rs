use crate::device::DeviceId;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum SwitchError {
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("Device already registered: {0}")]
    DeviceAlreadyRegistered(DeviceId),

    #[error("Button index out of range (expected 1-4): {0}")]
    InvalidButton(u8),

    #[error("Scene id out of range (expected 1-8): {0}")]
    InvalidSceneId(u8),

    #[error("Level out of range (expected 0-100): {0}")]
    InvalidLevel(i64),

    #[error("Device {device} rejected update: {reason}")]
    SinkRejected { device: DeviceId, reason: String },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    #[error(transparent)]
    MqttError(#[from] rumqttc::ClientError),
}

pub type Result<T> = std::result::Result<T, SwitchError>;
