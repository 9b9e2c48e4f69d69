//! Standard locations for vizdeck configuration files

use std::path::PathBuf;

/// Root configuration directory
///
/// Returns: `~/.config/vizdeck` (platform equivalent elsewhere)
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vizdeck")
}

/// Path of a config file inside [`config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}

/// Directory holding saved MIDI controller presets
pub fn midi_preset_dir() -> PathBuf {
    config_dir().join("midi")
}
