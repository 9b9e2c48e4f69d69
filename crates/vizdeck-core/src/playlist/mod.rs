//! Per-deck preset playlists
//!
//! A [`Playlist`] is plain data: an ordered list of presets with a current
//! position and advance settings. The [`PlaylistScheduler`] adds the moving
//! parts (shuffle randomness and auto-cycle timers).

mod scheduler;

pub use scheduler::PlaylistScheduler;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Auto-cycle bounds, in seconds
pub const MIN_CYCLE_SECS: u64 = 5;
pub const MAX_CYCLE_SECS: u64 = 300;
pub const DEFAULT_CYCLE_SECS: u64 = 30;

/// One playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub name: String,
    pub path: PathBuf,
}

/// Advance settings applied through `playlist_set_settings`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSettings {
    pub shuffle: bool,
    pub auto_cycle: bool,
    pub cycle_secs: u64,
}

/// Ordered preset list for one deck
///
/// `current_index` is always a valid index into `items`, or 0 when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub name: String,
    items: Vec<PlaylistItem>,
    current_index: usize,
    pub shuffle: bool,
    pub auto_cycle: bool,
    cycle_secs: u64,
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            items: Vec::new(),
            current_index: 0,
            shuffle: false,
            auto_cycle: false,
            cycle_secs: DEFAULT_CYCLE_SECS,
        }
    }
}

/// Validate an auto-cycle duration
pub fn check_cycle_secs(secs: u64) -> EngineResult<u64> {
    if (MIN_CYCLE_SECS..=MAX_CYCLE_SECS).contains(&secs) {
        Ok(secs)
    } else {
        Err(EngineError::InvalidCycleDuration(secs))
    }
}

impl Playlist {
    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&PlaylistItem> {
        self.items.get(self.current_index)
    }

    pub fn cycle_duration(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    pub fn settings(&self) -> PlaylistSettings {
        PlaylistSettings {
            shuffle: self.shuffle,
            auto_cycle: self.auto_cycle,
            cycle_secs: self.cycle_secs,
        }
    }

    /// Apply settings; the cycle duration must be within 5-300 seconds
    pub fn apply_settings(&mut self, settings: PlaylistSettings) -> EngineResult<()> {
        self.cycle_secs = check_cycle_secs(settings.cycle_secs)?;
        self.shuffle = settings.shuffle;
        self.auto_cycle = settings.auto_cycle;
        Ok(())
    }

    /// Append an item; duplicates are separate entries
    pub fn add(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.items.push(PlaylistItem {
            name: name.into(),
            path: path.into(),
        });
    }

    /// Remove the item at `index`
    ///
    /// Removing an item before the current one keeps the same item current.
    /// Removing the current item makes its successor current, wrapping to
    /// the first item when it was last (0 once the list is empty).
    pub fn remove(&mut self, index: usize) -> EngineResult<PlaylistItem> {
        self.check_index(index)?;
        let removed = self.items.remove(index);

        if index < self.current_index {
            self.current_index -= 1;
        } else if self.current_index >= self.items.len() {
            self.current_index = 0;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = 0;
    }

    /// Move an item; the current index follows the item it pointed at
    pub fn reorder(&mut self, from: usize, to: usize) -> EngineResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;

        let item = self.items.remove(from);
        self.items.insert(to, item);

        let current = self.current_index;
        if current == from {
            self.current_index = to;
        } else if from < current && to >= current {
            self.current_index -= 1;
        } else if from > current && to <= current {
            self.current_index += 1;
        }
        Ok(())
    }

    /// Make `index` current
    pub fn set_current(&mut self, index: usize) -> EngineResult<&PlaylistItem> {
        self.check_index(index)?;
        self.current_index = index;
        Ok(&self.items[index])
    }

    /// Sequential advance with wraparound; `None` when empty
    pub(crate) fn step_forward(&mut self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        self.current_index = (self.current_index + 1) % self.items.len();
        Some(self.current_index)
    }

    /// Sequential retreat with wraparound; `None` when empty
    pub(crate) fn step_back(&mut self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        let len = self.items.len();
        self.current_index = (self.current_index + len - 1) % len;
        Some(self.current_index)
    }

    fn check_index(&self, index: usize) -> EngineResult<()> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(EngineError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}
