//! Platform sink detection

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::monitors::{list_monitors, MonitorInfo};

/// Sysfs class directory listing video devices
const VIDEO4LINUX_CLASS: &str = "/sys/class/video4linux";

/// Present when the v4l2loopback kernel module is loaded
const LOOPBACK_MODULE: &str = "/sys/module/v4l2loopback";

/// Environment variables the NDI runtime installers set
const NDI_RUNTIME_ENV: [&str; 2] = ["NDI_RUNTIME_DIR_V6", "NDI_RUNTIME_DIR_V5"];

const NDI_LIBRARY_DIRS: [&str; 5] = [
    "/usr/lib",
    "/usr/local/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/opt/ndi/lib",
];

/// Spout runtime, loaded from the working directory or `bin/`
const SPOUT_LIBRARY: &str = "SpoutLibrary.dll";

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const SPOUT_LIBRARY_DIRS: [&str; 2] = [".", "bin"];

/// Sender name other applications see for the Spout sink
pub const SPOUT_SENDER_NAME: &str = "Vizdeck";

/// Which sink subsystems exist on this machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkCapabilities {
    pub loopback: bool,
    pub ndi: bool,
    /// Windows GPU texture sharing; never available elsewhere
    #[serde(default)]
    pub spout: bool,
}

/// A v4l2loopback device node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopbackDevice {
    pub path: PathBuf,
    pub name: String,
}

impl LoopbackDevice {
    /// `"<path>:<name>"`, as listed to users
    pub fn descriptor(&self) -> String {
        format!("{}:{}", self.path.display(), self.name)
    }
}

/// Detects sink subsystems and devices
///
/// Implementations touch the filesystem or spawn helpers, so callers run
/// them off the engine thread and cache the results.
pub trait SinkProbe: Send + Sync {
    fn capabilities(&self) -> SinkCapabilities;

    fn loopback_devices(&self) -> Vec<LoopbackDevice>;

    fn monitors(&self) -> Vec<MonitorInfo>;
}

/// User-facing output listing: loopback descriptors, then the Spout sender
pub fn video_output_listing(probe: &dyn SinkProbe, capabilities: SinkCapabilities) -> Vec<String> {
    let mut outputs: Vec<String> = if capabilities.loopback {
        probe
            .loopback_devices()
            .iter()
            .map(LoopbackDevice::descriptor)
            .collect()
    } else {
        Vec::new()
    };
    if capabilities.spout {
        outputs.push(format!("Spout:{}", SPOUT_SENDER_NAME));
    }
    outputs
}

/// Probes sysfs and the dynamic library paths
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

impl SinkProbe for SystemProbe {
    fn capabilities(&self) -> SinkCapabilities {
        let capabilities = SinkCapabilities {
            loopback: Path::new(LOOPBACK_MODULE).exists(),
            ndi: ndi_runtime_present(),
            spout: spout_runtime_present(),
        };
        let state = |present: bool| if present { "available" } else { "unavailable" };
        log::info!(
            "Video: loopback {}, NDI {}, Spout {}",
            state(capabilities.loopback),
            state(capabilities.ndi),
            state(capabilities.spout)
        );
        capabilities
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        list_monitors()
    }

    fn loopback_devices(&self) -> Vec<LoopbackDevice> {
        let entries = match std::fs::read_dir(VIDEO4LINUX_CLASS) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Video: cannot read {}: {}", VIDEO4LINUX_CLASS, e);
                return Vec::new();
            }
        };

        let mut devices: Vec<LoopbackDevice> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let node = entry.file_name().to_string_lossy().into_owned();
                let name = std::fs::read_to_string(entry.path().join("name")).ok()?;
                let driver = std::fs::read_link(entry.path().join("device")).ok();
                is_loopback(name.trim(), driver.as_deref()).then(|| LoopbackDevice {
                    path: Path::new("/dev").join(&node),
                    name: name.trim().to_string(),
                })
            })
            .collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }
}

/// A video4linux node belongs to v4l2loopback when its card name or its
/// parent device says so
fn is_loopback(name: &str, device_link: Option<&Path>) -> bool {
    name.to_ascii_lowercase().contains("loopback")
        || device_link
            .and_then(Path::file_name)
            .is_some_and(|parent| parent.to_string_lossy().starts_with("v4l2loopback"))
}

fn ndi_runtime_present() -> bool {
    let env_dirs = NDI_RUNTIME_ENV
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(PathBuf::from);
    let std_dirs = NDI_LIBRARY_DIRS.iter().map(PathBuf::from);

    env_dirs.chain(std_dirs).any(|dir| contains_ndi_library(&dir))
}

fn contains_ndi_library(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(Result::ok).any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with("libndi.so")
            || name.starts_with("libndi.dylib")
            || name.starts_with("Processing.NDI.Lib")
    })
}

#[cfg(target_os = "windows")]
fn spout_runtime_present() -> bool {
    SPOUT_LIBRARY_DIRS
        .iter()
        .any(|dir| contains_spout_library(Path::new(dir)))
}

#[cfg(not(target_os = "windows"))]
fn spout_runtime_present() -> bool {
    false
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn contains_spout_library(dir: &Path) -> bool {
    dir.join(SPOUT_LIBRARY).is_file()
}
