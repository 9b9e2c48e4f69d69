//! Core types shared across the vizdeck crates

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Number of decks supported by the engine
pub const NUM_DECKS: usize = 4;

/// Deck identifier (0-3)
///
/// Construction is checked, so holding a `DeckId` means the index is valid
/// for every per-deck array in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DeckId(u8);

impl DeckId {
    /// Create a deck ID, rejecting indices outside `0..NUM_DECKS`
    pub fn new(index: usize) -> EngineResult<Self> {
        if index < NUM_DECKS {
            Ok(Self(index as u8))
        } else {
            Err(EngineError::InvalidDeck(index))
        }
    }

    /// Iterate over every deck in index order
    pub fn all() -> impl Iterator<Item = DeckId> {
        (0..NUM_DECKS as u8).map(DeckId)
    }

    /// Deck for a per-deck array slot; `index` must be below `NUM_DECKS`
    pub(crate) fn from_array_index(index: usize) -> Self {
        debug_assert!(index < NUM_DECKS);
        Self(index as u8)
    }

    /// Array index for this deck
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the deck number (1-4 for display)
    pub fn display_number(self) -> usize {
        self.0 as usize + 1
    }
}

impl TryFrom<u8> for DeckId {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as usize)
    }
}

impl From<DeckId> for u8 {
    fn from(id: DeckId) -> Self {
        id.0
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stereo peak levels for metering (0.0 - 1.0 per channel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StereoLevels {
    pub left: f32,
    pub right: f32,
}

impl StereoLevels {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}
