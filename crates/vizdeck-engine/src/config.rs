//! Engine configuration
//!
//! Stored as YAML at `~/.config/vizdeck/engine.yaml`. Every field has a
//! default, so a partial file only overrides what it names.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vizdeck_core::audio::AudioConfig;
use vizdeck_core::compositor::{CompositorConfig, MAX_OUTPUT_HEIGHT, MAX_OUTPUT_WIDTH};
use vizdeck_core::config::{default_config_path, load_config, midi_preset_dir};
use vizdeck_core::crossfader::CrossfaderConfig;
use vizdeck_core::playlist::{DEFAULT_CYCLE_SECS, MAX_CYCLE_SECS, MIN_CYCLE_SECS};
use vizdeck_core::video::{primary_refresh_rate, MonitorInfo};
use vizdeck_core::DeckId;

/// File name of the engine config inside the config directory
pub const ENGINE_CONFIG_FILE: &str = "engine.yaml";

/// Refresh rate used when neither the config nor a monitor provides one
pub const FALLBACK_REFRESH_HZ: f32 = 60.0;

const REFRESH_RANGE_HZ: (f32, f32) = (1.0, 360.0);

/// MIDI startup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Connect to the first input port whose name contains this
    pub port_name: Option<String>,
    /// Built-in controller layout to load at startup
    pub builtin_preset: Option<String>,
    /// Saved preset file to load at startup (wins over `builtin_preset`)
    pub preset_file: Option<PathBuf>,
    /// Where `midi_save_preset` writes controller presets
    pub preset_dir: PathBuf,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            port_name: None,
            builtin_preset: None,
            preset_file: None,
            preset_dir: midi_preset_dir(),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Renderer executable; searched next to the binary and in the system
    /// paths when unset
    pub renderer_path: Option<PathBuf>,
    /// Default render size for decks started without one
    pub width: u32,
    pub height: u32,
    /// Time a renderer gets to exit after a stop request
    pub stop_grace_ms: u64,
    /// Audio pump cadence; the primary monitor's refresh rate when unset
    pub refresh_rate_hz: Option<f32>,
    /// Pump audio from the engine loop (disable when a frontend drives `pump_audio`)
    pub internal_pump: bool,
    pub audio: AudioConfig,
    pub crossfader: CrossfaderConfig,
    pub compositor: CompositorConfig,
    /// Auto-cycle duration given to every deck playlist at startup
    pub default_cycle_secs: u64,
    /// Preset library used by preset stepping when a deck has no playlist
    pub preset_dir: PathBuf,
    pub texture_paths: Vec<PathBuf>,
    pub midi: MidiSettings,
    /// Decks started when the headless runner comes up
    pub autostart_decks: Vec<DeckId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            renderer_path: None,
            width: 1280,
            height: 720,
            stop_grace_ms: 2000,
            refresh_rate_hz: None,
            internal_pump: true,
            audio: AudioConfig::default(),
            crossfader: CrossfaderConfig::default(),
            compositor: CompositorConfig::default(),
            default_cycle_secs: DEFAULT_CYCLE_SECS,
            preset_dir: PathBuf::from("/usr/share/projectM/presets"),
            texture_paths: Vec::new(),
            midi: MidiSettings::default(),
            autostart_decks: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Pump cadence in Hz: the configured override, else the primary
    /// monitor, else 60
    pub fn resolve_refresh_rate(&self, monitors: &[MonitorInfo]) -> f32 {
        self.refresh_rate_hz
            .or_else(|| primary_refresh_rate(monitors))
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .map(|hz| hz.clamp(REFRESH_RANGE_HZ.0, REFRESH_RANGE_HZ.1))
            .unwrap_or(FALLBACK_REFRESH_HZ)
    }

    /// Bring out-of-range values back into range
    pub fn sanitize(&mut self) {
        let cycle = self.default_cycle_secs.clamp(MIN_CYCLE_SECS, MAX_CYCLE_SECS);
        if cycle != self.default_cycle_secs {
            log::warn!(
                "Config: default_cycle_secs {} out of range, using {}",
                self.default_cycle_secs,
                cycle
            );
            self.default_cycle_secs = cycle;
        }

        let overlap: BTreeSet<DeckId> = self
            .crossfader
            .side_a
            .intersection(&self.crossfader.side_b)
            .copied()
            .collect();
        if !overlap.is_empty() {
            log::warn!(
                "Config: decks {:?} on both crossfader sides, using default sides",
                overlap
            );
            let defaults = CrossfaderConfig::default();
            self.crossfader.side_a = defaults.side_a;
            self.crossfader.side_b = defaults.side_b;
        }

        if !self.crossfader.position.is_finite() {
            self.crossfader.position = 0.5;
        }
        self.crossfader.position = self.crossfader.position.clamp(0.0, 1.0);

        if self.width == 0 || self.height == 0 {
            log::warn!("Config: invalid render size {}x{}, using 1280x720", self.width, self.height);
            self.width = 1280;
            self.height = 720;
        }

        let compositor = &mut self.compositor;
        if compositor.output_width == 0
            || compositor.output_height == 0
            || compositor.output_width > MAX_OUTPUT_WIDTH
            || compositor.output_height > MAX_OUTPUT_HEIGHT
        {
            let defaults = CompositorConfig::default();
            log::warn!(
                "Config: invalid compositor output {}x{}, using {}x{}",
                compositor.output_width,
                compositor.output_height,
                defaults.output_width,
                defaults.output_height
            );
            compositor.output_width = defaults.output_width;
            compositor.output_height = defaults.output_height;
        }

        let mut seen = BTreeSet::new();
        self.autostart_decks.retain(|deck| seen.insert(*deck));
    }
}

/// Default engine config location
pub fn default_engine_config_path() -> PathBuf {
    default_config_path(ENGINE_CONFIG_FILE)
}

/// Load and sanitize the engine config; defaults when missing or invalid
pub fn load_engine_config(path: &Path) -> EngineConfig {
    let mut config: EngineConfig = load_config(path);
    config.sanitize();
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizdeck_core::config::save_config;

    fn deck(i: usize) -> DeckId {
        DeckId::new(i).unwrap()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_engine_config(&dir.path().join("engine.yaml"));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.stop_grace(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(
            &path,
            "width: 1920\nautostart_decks: [0, 2]\nmidi:\n  builtin_preset: apc\n",
        )
        .unwrap();

        let config = load_engine_config(&path);
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 720);
        assert_eq!(config.autostart_decks, vec![deck(0), deck(2)]);
        assert_eq!(config.midi.builtin_preset.as_deref(), Some("apc"));
        assert!(config.internal_pump);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(
            &path,
            "default_cycle_secs: 1\ncrossfader:\n  position: 3.0\n  side_a: [0, 1]\n  side_b: [1, 2]\n",
        )
        .unwrap();

        let config = load_engine_config(&path);
        assert_eq!(config.default_cycle_secs, MIN_CYCLE_SECS);
        assert_eq!(config.crossfader.position, 1.0);
        assert_eq!(config.crossfader.side_a, CrossfaderConfig::default().side_a);
        assert_eq!(config.crossfader.side_b, CrossfaderConfig::default().side_b);
    }

    #[test]
    fn test_compositor_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(
            &path,
            "compositor:\n  enabled: true\n  output_width: 0\n  decks:\n    - opacity: 0.5\n      blend_mode: additive\n    - {}\n    - {}\n    - layer_order: -1\n",
        )
        .unwrap();

        let config = load_engine_config(&path);
        let compositor = &config.compositor;
        assert!(compositor.enabled);
        assert_eq!((compositor.output_width, compositor.output_height), (1920, 1080));
        assert_eq!(compositor.decks[0].opacity, 0.5);
        assert_eq!(
            compositor.decks[0].blend_mode,
            vizdeck_core::compositor::BlendMode::Add
        );
        assert_eq!(compositor.decks[3].layer_order, -1);
        assert!(compositor.link_to_crossfader);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.yaml");
        let mut config = EngineConfig::default();
        config.refresh_rate_hz = Some(144.0);
        config.texture_paths = vec![PathBuf::from("/textures")];
        save_config(&config, &path).unwrap();

        assert_eq!(load_engine_config(&path), config);
    }

    #[test]
    fn test_refresh_rate_resolution() {
        let monitor = MonitorInfo {
            index: 0,
            name: "DP-1".into(),
            width: 2560,
            height: 1440,
            x: 0,
            y: 0,
            refresh_hz: Some(143.97),
            is_primary: true,
        };
        let mut config = EngineConfig::default();
        assert_eq!(config.resolve_refresh_rate(&[]), FALLBACK_REFRESH_HZ);
        assert_eq!(config.resolve_refresh_rate(&[monitor.clone()]), 143.97);

        config.refresh_rate_hz = Some(75.0);
        assert_eq!(config.resolve_refresh_rate(&[monitor]), 75.0);

        config.refresh_rate_hz = Some(0.0);
        assert_eq!(config.resolve_refresh_rate(&[]), FALLBACK_REFRESH_HZ);
    }
}
