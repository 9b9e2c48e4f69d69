//! Built-in controller layouts and YAML preset files

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vizdeck_core::{DeckId, NUM_DECKS};

use crate::action::ActionKind;
use crate::mapping::MidiMapping;

/// File extension for saved presets
pub const PRESET_FILE_EXTENSION: &str = "yaml";

/// Named set of mappings for a controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiPreset {
    pub name: String,
    pub description: String,
    /// Target controller model
    pub controller: String,
    pub mappings: Vec<MidiMapping>,
}

impl MidiPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

struct Builtin {
    name: &'static str,
    aliases: &'static [&'static str],
    build: fn() -> MidiPreset,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "Generic DJ Controller",
        aliases: &["generic"],
        build: generic_dj,
    },
    Builtin {
        name: "Akai APC Mini",
        aliases: &["apc", "akai", "apc mini"],
        build: apc_mini,
    },
    Builtin {
        name: "Novation Launchpad",
        aliases: &["launchpad"],
        build: launchpad,
    },
    Builtin {
        name: "Korg nanoKONTROL2",
        aliases: &["nanokontrol", "nanokontrol2"],
        build: nanokontrol2,
    },
];

/// Names of every built-in layout
pub fn builtin_preset_names() -> Vec<&'static str> {
    BUILTINS.iter().map(|b| b.name).collect()
}

/// Look up a built-in layout by name or alias (case-insensitive)
pub fn builtin_preset(name: &str) -> Option<MidiPreset> {
    let wanted = name.trim().to_lowercase();
    BUILTINS
        .iter()
        .find(|b| b.name.to_lowercase() == wanted || b.aliases.contains(&wanted.as_str()))
        .map(|b| (b.build)())
}

fn decks(count: usize) -> impl Iterator<Item = (u8, DeckId)> {
    DeckId::all().take(count).map(|deck| (u8::from(deck), deck))
}

fn generic_dj() -> MidiPreset {
    let mut preset = MidiPreset::new("Generic DJ Controller");
    preset.description = "Basic mapping for 2-deck DJ controllers".to_string();
    preset.controller = "Generic".to_string();

    preset
        .mappings
        .push(MidiMapping::cc("Crossfader", 0, 0, ActionKind::Crossfader));

    // One MIDI channel per deck
    for (n, deck) in decks(2) {
        let label = deck.display_number();
        preset.mappings.extend(
            [
                MidiMapping::cc(format!("Deck {} Volume", label), n, 7, ActionKind::DeckVolume),
                MidiMapping::note(format!("Deck {} Play", label), n, 36, ActionKind::DeckToggle),
                MidiMapping::note(format!("Deck {} Next Preset", label), n, 37, ActionKind::NextPreset),
                MidiMapping::note(format!("Deck {} Prev Preset", label), n, 38, ActionKind::PreviousPreset),
                MidiMapping::note(format!("Deck {} Random", label), n, 39, ActionKind::RandomPreset),
            ]
            .map(|m| m.with_deck(deck)),
        );
    }

    preset
}

fn apc_mini() -> MidiPreset {
    let mut preset = MidiPreset::new("Akai APC Mini");
    preset.description = "Faders for volume, pad rows for deck and preset control".to_string();
    preset.controller = "Akai APC Mini".to_string();

    // Fader 1 (CC 48) is the crossfader, faders 2-5 the deck volumes
    preset
        .mappings
        .push(MidiMapping::cc("Crossfader", 0, 48, ActionKind::Crossfader));

    for (n, deck) in decks(NUM_DECKS) {
        let label = deck.display_number();
        preset.mappings.extend(
            [
                MidiMapping::cc(format!("Deck {} Volume", label), 0, 49 + n, ActionKind::DeckVolume),
                MidiMapping::note(format!("Deck {} Toggle", label), 0, 64 + n, ActionKind::DeckToggle),
                MidiMapping::note(format!("Deck {} Next", label), 0, 56 + n, ActionKind::NextPreset),
                MidiMapping::note(format!("Deck {} Prev", label), 0, 48 + n, ActionKind::PreviousPreset),
                MidiMapping::note(format!("Deck {} Random", label), 0, 40 + n, ActionKind::RandomPreset),
            ]
            .map(|m| m.with_deck(deck)),
        );
    }

    preset
}

fn launchpad() -> MidiPreset {
    let mut preset = MidiPreset::new("Novation Launchpad");
    preset.description = "Grid rows for toggle, next, previous and random".to_string();
    preset.controller = "Novation Launchpad".to_string();

    // Rows of the 8x8 grid are 16 notes apart
    for (n, deck) in decks(NUM_DECKS) {
        let label = deck.display_number();
        preset.mappings.extend(
            [
                MidiMapping::note(format!("Deck {} Toggle", label), 0, n, ActionKind::DeckToggle),
                MidiMapping::note(format!("Deck {} Next", label), 0, 16 + n, ActionKind::NextPreset),
                MidiMapping::note(format!("Deck {} Prev", label), 0, 32 + n, ActionKind::PreviousPreset),
                MidiMapping::note(format!("Deck {} Random", label), 0, 48 + n, ActionKind::RandomPreset),
            ]
            .map(|m| m.with_deck(deck)),
        );
    }

    preset
}

fn nanokontrol2() -> MidiPreset {
    let mut preset = MidiPreset::new("Korg nanoKONTROL2");
    preset.description = "Faders, knobs and S/M/R buttons per deck".to_string();
    preset.controller = "Korg nanoKONTROL2".to_string();

    preset
        .mappings
        .push(MidiMapping::cc("Crossfader", 0, 4, ActionKind::Crossfader));

    for (n, deck) in decks(NUM_DECKS) {
        let label = deck.display_number();
        preset.mappings.extend(
            [
                MidiMapping::cc(format!("Deck {} Volume", label), 0, n, ActionKind::DeckVolume),
                MidiMapping::cc(format!("Deck {} Toggle", label), 0, 32 + n, ActionKind::DeckToggle),
                MidiMapping::cc(format!("Deck {} Next", label), 0, 48 + n, ActionKind::NextPreset),
                MidiMapping::cc(format!("Deck {} Random", label), 0, 64 + n, ActionKind::RandomPreset),
                MidiMapping::cc(
                    format!("Deck {} Beat Sens", label),
                    0,
                    16 + n,
                    ActionKind::BeatSensitivity,
                ),
            ]
            .map(|m| m.with_deck(deck)),
        );
    }

    preset
}

/// Save a preset as `<dir>/<sanitized name>.yaml`
///
/// Creates the directory if needed and returns the written path.
pub fn save_preset_file(preset: &MidiPreset, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create MIDI preset directory {:?}", dir))?;

    let path = dir
        .join(file_stem(&preset.name))
        .with_extension(PRESET_FILE_EXTENSION);
    let yaml = serde_yaml::to_string(preset).context("Failed to serialize MIDI preset")?;
    fs::write(&path, yaml).with_context(|| format!("Failed to write MIDI preset {:?}", path))?;

    log::info!("MIDI: Saved preset '{}' to {:?}", preset.name, path);
    Ok(path)
}

/// Load a preset file
pub fn load_preset_file(path: &Path) -> Result<MidiPreset> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read MIDI preset {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse MIDI preset {:?}", path))
}

/// Preset files in a directory, sorted; empty if the directory is missing
pub fn list_preset_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == PRESET_FILE_EXTENSION))
        .collect();
    files.sort();
    files
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "preset".to_string()
    } else {
        stem
    }
}
