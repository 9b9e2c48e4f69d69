//! Audio device enumeration
//!
//! Lists capture candidates from every available cpal host plus, on Linux,
//! the PulseAudio/PipeWire monitor sources reported by `pactl`. Monitor
//! sources capture what the system is playing, which is what most users
//! want to visualize.

use std::process::Command;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::HostId;
use serde::{Deserialize, Serialize};

use super::config::AUTO_DEVICE;
use super::error::{AudioError, AudioResult};

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Microphone / line in
    Input,
    /// Output device (loopback capture where the host supports it)
    Output,
    /// System audio monitor
    Monitor,
}

/// Read-only snapshot of a capture device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Name passed back to `start_audio`
    pub name: String,
    /// Human-readable label
    pub description: String,
    pub is_default: bool,
    pub device_type: DeviceType,
    /// cpal host backend (e.g. "ALSA", "JACK"), `None` for pactl sources
    pub host: Option<String>,
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// List every capture candidate
///
/// The `auto` entry is always first. Enumeration failures on individual
/// hosts are logged and skipped.
pub fn list_audio_devices() -> Vec<AudioDevice> {
    let mut devices = vec![AudioDevice {
        name: AUTO_DEVICE.to_string(),
        description: "System Audio (Auto-detect)".to_string(),
        is_default: true,
        device_type: DeviceType::Monitor,
        host: None,
    }];

    devices.extend(monitor_sources().into_iter().map(|name| AudioDevice {
        description: format!("{} (Monitor)", describe_monitor(&name)),
        name,
        is_default: false,
        device_type: DeviceType::Monitor,
        host: None,
    }));

    devices.extend(cpal_devices());

    log::info!("Audio: found {} capture devices", devices.len());
    devices
}

fn cpal_devices() -> Vec<AudioDevice> {
    let mut devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Audio: could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);

        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        match host.input_devices() {
            Ok(inputs) => {
                for device in inputs {
                    let Ok(name) = device.name() else { continue };
                    devices.push(AudioDevice {
                        description: format!("[{}] {} (Input)", host_label, name),
                        is_default: default_input.as_ref() == Some(&name),
                        device_type: DeviceType::Input,
                        host: Some(host_label.clone()),
                        name,
                    });
                }
            }
            Err(e) => log::debug!("Audio: could not enumerate inputs for {:?}: {}", host_id, e),
        }

        match host.output_devices() {
            Ok(outputs) => {
                for device in outputs {
                    let Ok(name) = device.name() else { continue };
                    devices.push(AudioDevice {
                        description: format!("[{}] {} (Output)", host_label, name),
                        is_default: false,
                        device_type: DeviceType::Output,
                        host: Some(host_label.clone()),
                        name,
                    });
                }
            }
            Err(e) => log::debug!("Audio: could not enumerate outputs for {:?}: {}", host_id, e),
        }
    }

    devices
}

/// Monitor source names from `pactl list sources short`
///
/// Empty when pactl is missing or fails.
pub fn monitor_sources() -> Vec<String> {
    if !cfg!(target_os = "linux") {
        return Vec::new();
    }
    match Command::new("pactl").args(["list", "sources", "short"]).output() {
        Ok(output) if output.status.success() => {
            parse_pactl_sources(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            log::debug!("Audio: pactl exited with {}", output.status);
            Vec::new()
        }
        Err(e) => {
            log::debug!("Audio: pactl not available: {}", e);
            Vec::new()
        }
    }
}

/// First monitor source, used when the device is `auto`
pub fn find_default_monitor() -> Option<String> {
    monitor_sources().into_iter().next()
}

/// Extract `.monitor` source names from tab-separated pactl output
pub fn parse_pactl_sources(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(str::trim)
        .filter(|name| is_monitor_name(name))
        .map(str::to_string)
        .collect()
}

/// Whether a device name refers to a Pulse/PipeWire monitor source
pub fn is_monitor_name(name: &str) -> bool {
    name.ends_with(".monitor")
}

fn describe_monitor(name: &str) -> String {
    name.trim_start_matches("alsa_output.")
        .trim_end_matches(".monitor")
        .replace(['_', '-'], " ")
}

/// Find a cpal input device by name across all hosts
pub(crate) fn find_input_device(name: &str) -> AudioResult<cpal::Device> {
    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        if let Ok(mut devices) = host.input_devices() {
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                return Ok(device);
            }
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Default input device of the default host
pub(crate) fn default_input_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default input device".to_string()))
}
