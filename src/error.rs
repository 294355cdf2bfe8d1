//! Error types for device and stream control

use thiserror::Error;

/// Errors reported by the control surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Requested audio device is not available: {0}")]
    DeviceUnavailable(String),

    #[error("Error opening audio stream: {0}")]
    StreamOpenFailed(String),

    #[error("Error controlling audio stream: {0}")]
    StreamControlFailed(String),

    #[error("Clip is missing audio or too short to play: {0}")]
    UnplayableClip(String),
}

/// A failure inside the host audio layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(err: impl ToString) -> Self {
        Self(err.to_string())
    }
}
