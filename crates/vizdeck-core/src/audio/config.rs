//! Audio capture configuration

use serde::{Deserialize, Serialize};

/// Default capture sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default capture buffer size in frames
pub const DEFAULT_BUFFER_SIZE: u32 = 1024;

/// Captured audio is always delivered as interleaved stereo
pub const CAPTURE_CHANNELS: u16 = 2;

/// Device name that selects the first system monitor, else the default input
pub const AUTO_DEVICE: &str = "auto";

/// Configuration for audio capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device name (None or "auto" = auto-detect)
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Preferred buffer size in frames (may be adjusted by the system)
    pub buffer_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: CAPTURE_CHANNELS,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl AudioConfig {
    /// Set the capture device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Device name to open, `None` for auto-detection
    pub fn requested_device(&self) -> Option<&str> {
        self.device
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != AUTO_DEVICE)
    }

    /// Samples held by the capture ring (about one second of audio)
    pub fn ring_capacity(&self) -> usize {
        (self.sample_rate.max(8000) as usize) * CAPTURE_CHANNELS as usize
    }
}
