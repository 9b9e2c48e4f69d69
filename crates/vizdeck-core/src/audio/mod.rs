//! Audio capture for the visualization decks
//!
//! Captures system audio (a Pulse/PipeWire monitor, or any cpal input
//! device) and pumps it into every running renderer once per rendered
//! frame.
//!
//! # Architecture
//!
//! - **Capture thread**: owns the cpal stream (or the parec reader) and
//!   pushes interleaved stereo f32 into a lock-free ring buffer
//! - **Control thread**: drains the ring on each pump tick, meters it and
//!   queues scaled copies to the decks
//!
//! # Example Usage
//!
//! ```ignore
//! use vizdeck_core::audio::{AudioConfig, AudioPump, SystemCapture};
//!
//! let mut pump = AudioPump::new(Box::new(SystemCapture::new()), AudioConfig::default());
//! pump.start(Some("alsa_output.pci-0000_00_1f.3.analog-stereo.monitor".into()))?;
//!
//! // Once per frame
//! let report = pump.pump(&mut decks, &crossfader.gains(), master_volume);
//! ```

mod capture;
mod config;
mod device;
mod error;
mod pump;

pub use capture::{CaptureBackend, SystemCapture};
pub use config::{AudioConfig, AUTO_DEVICE, CAPTURE_CHANNELS, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
pub use device::{
    find_default_monitor, is_monitor_name, list_audio_devices, monitor_sources,
    parse_pactl_sources, AudioDevice, DeviceType,
};
pub use error::{AudioError, AudioResult};
pub use pump::{peak_levels, AudioPump, PumpHealth, PumpReport, FAILURE_WARN_THRESHOLD};
