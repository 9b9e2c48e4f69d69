//! Read-only snapshots for the presentation layer

use std::path::PathBuf;

use serde::Serialize;
use vizdeck_core::compositor::CompositorConfig;
use vizdeck_core::crossfader::CrossfaderConfig;
use vizdeck_core::deck::DeckState;
use vizdeck_core::playlist::Playlist;
use vizdeck_core::video::DeckOutputs;
use vizdeck_core::{DeckId, StereoLevels};
use vizdeck_midi::MidiStatus;

/// Playlist position and advance settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistSummary {
    pub name: String,
    pub len: usize,
    pub current_index: usize,
    pub current_name: Option<String>,
    pub shuffle: bool,
    pub auto_cycle: bool,
    pub cycle_secs: u64,
    /// Whether an auto-cycle timer is pending
    pub timer_armed: bool,
}

impl PlaylistSummary {
    pub fn new(playlist: &Playlist, timer_armed: bool) -> Self {
        let settings = playlist.settings();
        Self {
            name: playlist.name.clone(),
            len: playlist.len(),
            current_index: playlist.current_index(),
            current_name: playlist.current().map(|item| item.name.clone()),
            shuffle: settings.shuffle,
            auto_cycle: settings.auto_cycle,
            cycle_secs: settings.cycle_secs,
            timer_armed,
        }
    }
}

/// One deck
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckStatus {
    pub id: DeckId,
    pub state: DeckState,
    pub preset: Option<PathBuf>,
    pub volume: f32,
    pub beat_sensitivity: f32,
    pub uptime_secs: u64,
    pub crash_count: u32,
    pub playlist: PlaylistSummary,
    pub outputs: DeckOutputs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioStatus {
    pub enabled: bool,
    pub device: Option<String>,
    pub levels: StereoLevels,
    pub consecutive_failures: u32,
}

/// Everything `get_multi_deck_status` reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiDeckStatus {
    pub decks: Vec<DeckStatus>,
    pub crossfader: CrossfaderConfig,
    pub compositor: CompositorConfig,
    pub audio: AudioStatus,
    pub master_volume: f32,
    pub midi: MidiStatus,
    pub ndi_available: bool,
    pub loopback_available: bool,
    pub spout_available: bool,
}

impl MultiDeckStatus {
    pub fn deck(&self, id: DeckId) -> Option<&DeckStatus> {
        self.decks.iter().find(|deck| deck.id == id)
    }

    pub fn running_count(&self) -> usize {
        self.decks.iter().filter(|deck| deck.state.is_running()).count()
    }
}
