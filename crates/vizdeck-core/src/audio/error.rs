//! Audio capture error types

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    /// No capture devices available
    #[error("No audio capture devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build capture stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start stream or capture process
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Stream error during capture
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Capture has not been started
    #[error("Audio capture is not running")]
    NotStarted,
}

impl AudioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDevices
            | Self::NoDefaultDevice(_)
            | Self::DeviceNotFound(_)
            | Self::UnsupportedFormat(_) => ErrorKind::ResourceUnavailable,
            Self::ConfigError(_)
            | Self::StreamBuildError(_)
            | Self::StreamPlayError(_)
            | Self::StreamError(_) => ErrorKind::TransientIo,
            Self::NotStarted => ErrorKind::StateConflict,
        }
    }
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
