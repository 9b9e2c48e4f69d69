//! Actions a MIDI control can be bound to

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MidiError;
use crate::transform::ValueTransform;

/// What a mapped control does
///
/// Deck-scoped actions take their deck from the mapping's `target_deck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // Deck lifecycle
    DeckStart,
    DeckStop,
    DeckToggle,
    DeckVolume,
    BeatSensitivity,

    // Presets
    NextPreset,
    PreviousPreset,
    RandomPreset,
    LoadPresetByIndex { index: usize },

    // Playlist
    PlaylistNext,
    PlaylistPrevious,
    ShuffleToggle,
    AutoCycleToggle,

    // Crossfader
    Crossfader,
    CrossfaderCurveToggle,
    CrossfaderEnableToggle,

    // Global
    MasterVolume,
    ToggleFullscreen,
    VideoOutputToggle,
}

/// Action names accepted by learn mode
pub const LEARNABLE_ACTIONS: &[&str] = &[
    "deck_volume",
    "deck_start",
    "deck_stop",
    "deck_toggle",
    "next_preset",
    "previous_preset",
    "random_preset",
    "crossfader",
    "beat_sensitivity",
    "playlist_next",
    "playlist_previous",
    "shuffle_toggle",
    "auto_cycle_toggle",
    "master_volume",
    "toggle_fullscreen",
    "video_output_toggle",
];

impl ActionKind {
    /// Resolve a learn-mode action name
    pub fn from_learn_name(name: &str) -> Option<Self> {
        let action = match name.trim().to_lowercase().as_str() {
            "deck_volume" => Self::DeckVolume,
            "deck_start" => Self::DeckStart,
            "deck_stop" => Self::DeckStop,
            "deck_toggle" => Self::DeckToggle,
            "next_preset" => Self::NextPreset,
            "previous_preset" => Self::PreviousPreset,
            "random_preset" => Self::RandomPreset,
            "crossfader" => Self::Crossfader,
            "beat_sensitivity" => Self::BeatSensitivity,
            "playlist_next" => Self::PlaylistNext,
            "playlist_previous" => Self::PlaylistPrevious,
            "shuffle_toggle" => Self::ShuffleToggle,
            "auto_cycle_toggle" => Self::AutoCycleToggle,
            "master_volume" => Self::MasterVolume,
            "toggle_fullscreen" => Self::ToggleFullscreen,
            "video_output_toggle" => Self::VideoOutputToggle,
            _ => return None,
        };
        Some(action)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DeckStart => "deck_start",
            Self::DeckStop => "deck_stop",
            Self::DeckToggle => "deck_toggle",
            Self::DeckVolume => "deck_volume",
            Self::BeatSensitivity => "beat_sensitivity",
            Self::NextPreset => "next_preset",
            Self::PreviousPreset => "previous_preset",
            Self::RandomPreset => "random_preset",
            Self::LoadPresetByIndex { .. } => "load_preset_by_index",
            Self::PlaylistNext => "playlist_next",
            Self::PlaylistPrevious => "playlist_previous",
            Self::ShuffleToggle => "shuffle_toggle",
            Self::AutoCycleToggle => "auto_cycle_toggle",
            Self::Crossfader => "crossfader",
            Self::CrossfaderCurveToggle => "crossfader_curve_toggle",
            Self::CrossfaderEnableToggle => "crossfader_enable_toggle",
            Self::MasterVolume => "master_volume",
            Self::ToggleFullscreen => "toggle_fullscreen",
            Self::VideoOutputToggle => "video_output_toggle",
        }
    }

    /// Whether the action operates on a single deck
    pub fn needs_deck(&self) -> bool {
        !matches!(
            self,
            Self::Crossfader
                | Self::CrossfaderCurveToggle
                | Self::CrossfaderEnableToggle
                | Self::MasterVolume
        )
    }

    /// Whether the action uses the control's value rather than firing on press
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            Self::DeckVolume | Self::BeatSensitivity | Self::Crossfader | Self::MasterVolume
        )
    }
}

impl ActionKind {
    /// Transform given to new mappings of this action
    ///
    /// Beat sensitivity spans 0-5 on the renderer, so its controls are
    /// scaled to cover that range.
    pub fn default_transform(&self) -> Option<ValueTransform> {
        match self {
            Self::BeatSensitivity => Some(ValueTransform {
                max: 5.0,
                ..Default::default()
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadPresetByIndex { index } => write!(f, "load_preset_by_index({})", index),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for ActionKind {
    type Err = MidiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_learn_name(s).ok_or_else(|| MidiError::UnknownAction(s.to_string()))
    }
}
