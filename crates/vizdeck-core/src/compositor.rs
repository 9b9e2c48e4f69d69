//! Compositor - how the four decks layer into one output frame
//!
//! Each deck contributes a layer with an opacity, a blend mode and a stack
//! position. The renderers draw their own layer; this module owns the
//! settings and works out what each renderer should be told. When linked
//! to the crossfader, a deck's opacity follows its crossfader gain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crossfader::CrossfaderConfig;
use crate::deck::RendererCommand;
use crate::error::{EngineError, EngineResult};
use crate::types::{DeckId, NUM_DECKS};

/// Largest accepted output edge (8K UHD)
pub const MAX_OUTPUT_WIDTH: u32 = 7680;
pub const MAX_OUTPUT_HEIGHT: u32 = 4320;

/// How a layer combines with the layers beneath it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    #[serde(alias = "additive")]
    Add,
    Multiply,
    Screen,
    Overlay,
}

impl BlendMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlendMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "add" | "additive" => Ok(Self::Add),
            "multiply" => Ok(Self::Multiply),
            "screen" => Ok(Self::Screen),
            "overlay" => Ok(Self::Overlay),
            _ => Err(EngineError::UnknownBlendMode(s.to_string())),
        }
    }
}

/// One deck's layer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckLayer {
    /// 0.0 (invisible) to 1.0
    pub opacity: f32,
    pub blend_mode: BlendMode,
    /// Lower layers are drawn first
    pub layer_order: i32,
    pub enabled: bool,
}

impl Default for DeckLayer {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            layer_order: 0,
            enabled: true,
        }
    }
}

impl DeckLayer {
    fn for_deck(deck: DeckId) -> Self {
        Self {
            layer_order: deck.index() as i32,
            ..Self::default()
        }
    }
}

/// Compositor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub enabled: bool,
    pub output_width: u32,
    pub output_height: u32,
    pub decks: [DeckLayer; NUM_DECKS],
    /// Scale each deck's opacity by its crossfader gain
    pub link_to_crossfader: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_width: 1920,
            output_height: 1080,
            decks: std::array::from_fn(|i| DeckLayer::for_deck(DeckId::from_array_index(i))),
            link_to_crossfader: true,
        }
    }
}

impl CompositorConfig {
    pub fn layer(&self, deck: DeckId) -> &DeckLayer {
        &self.decks[deck.index()]
    }

    /// What the deck's renderer should draw, given the current crossfader
    pub fn layer_state(&self, deck: DeckId, crossfader: &CrossfaderConfig) -> LayerState {
        let layer = self.layer(deck);
        let gain = if self.link_to_crossfader {
            crossfader.gain_for_deck(deck)
        } else {
            1.0
        };
        LayerState {
            composited: self.enabled && layer.enabled,
            opacity: (layer.opacity * gain).clamp(0.0, 1.0),
            blend_mode: layer.blend_mode,
            layer_order: layer.layer_order,
        }
    }
}

/// Effective layer parameters sent to a renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerState {
    pub composited: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub layer_order: i32,
}

impl LayerState {
    pub fn command(&self) -> RendererCommand {
        RendererCommand::SetLayer {
            composited: self.composited,
            opacity: self.opacity,
            blend_mode: self.blend_mode,
            layer_order: self.layer_order,
        }
    }
}

/// Compositor state plus the layer each renderer was last told about
#[derive(Debug, Default)]
pub struct Compositor {
    config: CompositorConfig,
    sent: [Option<LayerState>; NUM_DECKS],
}

impl Compositor {
    /// Build from a stored config, rejecting an out-of-range resolution
    pub fn new(config: CompositorConfig) -> EngineResult<Self> {
        check_resolution(config.output_width, config.output_height)?;
        let mut compositor = Self {
            config,
            sent: Default::default(),
        };
        for deck in DeckId::all() {
            let opacity = compositor.config.layer(deck).opacity;
            compositor.config.decks[deck.index()].opacity =
                if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        }
        Ok(compositor)
    }

    pub fn get_config(&self) -> CompositorConfig {
        self.config.clone()
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) -> EngineResult<()> {
        check_resolution(width, height)?;
        self.config.output_width = width;
        self.config.output_height = height;
        Ok(())
    }

    /// Clamped to 0.0-1.0; NaN is rejected
    pub fn set_deck_opacity(&mut self, deck: DeckId, opacity: f32) -> EngineResult<f32> {
        if opacity.is_nan() {
            return Err(EngineError::InvalidOpacity(opacity));
        }
        let opacity = opacity.clamp(0.0, 1.0);
        self.config.decks[deck.index()].opacity = opacity;
        Ok(opacity)
    }

    pub fn set_deck_blend_mode(&mut self, deck: DeckId, mode: BlendMode) {
        self.config.decks[deck.index()].blend_mode = mode;
    }

    pub fn set_deck_layer(&mut self, deck: DeckId, layer_order: i32) {
        self.config.decks[deck.index()].layer_order = layer_order;
    }

    pub fn set_deck_enabled(&mut self, deck: DeckId, enabled: bool) {
        self.config.decks[deck.index()].enabled = enabled;
    }

    pub fn set_link_to_crossfader(&mut self, linked: bool) {
        self.config.link_to_crossfader = linked;
    }

    /// The layer command for `deck` if it differs from what was last sent
    pub fn pending(&self, deck: DeckId, crossfader: &CrossfaderConfig) -> Option<LayerState> {
        let state = self.config.layer_state(deck, crossfader);
        (self.sent[deck.index()] != Some(state)).then_some(state)
    }

    pub fn mark_sent(&mut self, deck: DeckId, state: LayerState) {
        self.sent[deck.index()] = Some(state);
    }

    /// Forget what a renderer was told; its replacement starts from scratch
    pub fn forget(&mut self, deck: DeckId) {
        self.sent[deck.index()] = None;
    }
}

fn check_resolution(width: u32, height: u32) -> EngineResult<()> {
    if width == 0 || height == 0 || width > MAX_OUTPUT_WIDTH || height > MAX_OUTPUT_HEIGHT {
        return Err(EngineError::InvalidResolution { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossfader::Crossfader;

    const EPS: f32 = 1e-5;

    fn deck(i: usize) -> DeckId {
        DeckId::new(i).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = CompositorConfig::default();
        assert!(!config.enabled);
        assert_eq!((config.output_width, config.output_height), (1920, 1080));
        assert!(config.link_to_crossfader);
        for d in DeckId::all() {
            let layer = config.layer(d);
            assert_eq!(layer.opacity, 1.0);
            assert_eq!(layer.blend_mode, BlendMode::Normal);
            assert_eq!(layer.layer_order, d.index() as i32);
            assert!(layer.enabled);
        }
    }

    #[test]
    fn test_blend_mode_names() {
        assert_eq!("additive".parse::<BlendMode>().unwrap(), BlendMode::Add);
        assert_eq!("Screen".parse::<BlendMode>().unwrap(), BlendMode::Screen);
        assert_eq!(BlendMode::Overlay.to_string(), "overlay");
        let err = "dissolve".parse::<BlendMode>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_resolution_bounds() {
        let mut compositor = Compositor::default();
        compositor.set_resolution(3840, 2160).unwrap();
        assert_eq!(compositor.config().output_width, 3840);

        for (w, h) in [(0, 1080), (1920, 0), (7681, 1080), (1920, 4321)] {
            assert!(matches!(
                compositor.set_resolution(w, h),
                Err(EngineError::InvalidResolution { .. })
            ));
        }
        assert_eq!(compositor.config().output_height, 2160);
    }

    #[test]
    fn test_opacity_clamped_and_nan_rejected() {
        let mut compositor = Compositor::default();
        assert_eq!(compositor.set_deck_opacity(deck(1), 1.7).unwrap(), 1.0);
        assert_eq!(compositor.set_deck_opacity(deck(1), -0.2).unwrap(), 0.0);
        assert!(compositor.set_deck_opacity(deck(1), f32::NAN).is_err());
        assert_eq!(compositor.config().layer(deck(1)).opacity, 0.0);
    }

    #[test]
    fn test_linked_opacity_follows_crossfader() {
        let mut compositor = Compositor::default();
        compositor.set_enabled(true);
        compositor.set_deck_opacity(deck(0), 0.5).unwrap();

        let mut crossfader = Crossfader::default();
        crossfader.set_enabled(true);
        crossfader.set_position(1.0);

        // Deck 0 sits on side A, fully faded out
        let state = compositor.config().layer_state(deck(0), crossfader.config());
        assert!(state.composited);
        assert!(state.opacity.abs() < EPS);

        compositor.set_link_to_crossfader(false);
        let state = compositor.config().layer_state(deck(0), crossfader.config());
        assert!((state.opacity - 0.5).abs() < EPS);
    }

    #[test]
    fn test_disabled_layer_is_hidden() {
        let mut compositor = Compositor::default();
        let crossfader = CrossfaderConfig::default();
        assert!(!compositor.config().layer_state(deck(2), &crossfader).composited);

        compositor.set_enabled(true);
        compositor.set_deck_enabled(deck(2), false);
        assert!(!compositor.config().layer_state(deck(2), &crossfader).composited);
        assert!(compositor.config().layer_state(deck(3), &crossfader).composited);
    }

    #[test]
    fn test_pending_only_reports_changes() {
        let mut compositor = Compositor::default();
        let crossfader = CrossfaderConfig::default();
        let state = compositor.pending(deck(0), &crossfader).unwrap();
        compositor.mark_sent(deck(0), state);
        assert!(compositor.pending(deck(0), &crossfader).is_none());

        compositor.set_deck_blend_mode(deck(0), BlendMode::Multiply);
        let state = compositor.pending(deck(0), &crossfader).unwrap();
        assert_eq!(state.blend_mode, BlendMode::Multiply);
        compositor.mark_sent(deck(0), state);

        compositor.forget(deck(0));
        assert!(compositor.pending(deck(0), &crossfader).is_some());
    }

    #[test]
    fn test_stored_config_sanitized() {
        let mut config = CompositorConfig::default();
        config.decks[3].opacity = 4.0;
        let compositor = Compositor::new(config).unwrap();
        assert_eq!(compositor.config().layer(deck(3)).opacity, 1.0);

        let config = CompositorConfig {
            output_width: 0,
            ..CompositorConfig::default()
        };
        assert!(Compositor::new(config).is_err());
    }

    #[test]
    fn test_config_yaml_partial() {
        let config: CompositorConfig =
            serde_yaml::from_str("enabled: true\nlink_to_crossfader: false\n").unwrap();
        assert!(config.enabled);
        assert!(!config.link_to_crossfader);
        assert_eq!(config.output_width, 1920);
        assert_eq!(config.decks[2].layer_order, 2);
    }
}
