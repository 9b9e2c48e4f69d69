//! Crossfader - per-deck gain from a fader position
//!
//! Decks are grouped into side A and side B. Moving the fader towards 0.0
//! favors side A, towards 1.0 side B. Decks on neither side always play at
//! full gain, and a disabled crossfader leaves every deck at full gain.
//!
//! Pure computation; the engine multiplies these gains into the audio it
//! pumps to each deck.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{DeckId, NUM_DECKS};

/// Crossfade curve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfaderCurve {
    /// Straight volume blend
    Linear,
    /// sqrt blend, constant perceived loudness through the center
    #[default]
    EqualPower,
}

impl CrossfaderCurve {
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EqualPower => "equal_power",
        }
    }

    /// The other curve
    pub fn toggled(self) -> Self {
        match self {
            Self::Linear => Self::EqualPower,
            Self::EqualPower => Self::Linear,
        }
    }
}

impl fmt::Display for CrossfaderCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CrossfaderCurve {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "equal_power" | "equalpower" => Ok(Self::EqualPower),
            _ => Err(EngineError::UnknownCurve(s.to_string())),
        }
    }
}

/// Crossfader side a deck can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
    None,
}

impl FromStr for Side {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "none" => Ok(Self::None),
            _ => Err(EngineError::UnknownSide(s.to_string())),
        }
    }
}

/// Crossfader configuration
///
/// `side_a` and `side_b` never share a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossfaderConfig {
    /// 0.0 = full side A, 0.5 = center, 1.0 = full side B
    pub position: f32,
    pub side_a: BTreeSet<DeckId>,
    pub side_b: BTreeSet<DeckId>,
    pub curve: CrossfaderCurve,
    pub enabled: bool,
}

impl Default for CrossfaderConfig {
    fn default() -> Self {
        let deck = DeckId::from_array_index;
        Self {
            position: 0.5,
            side_a: [deck(0), deck(1)].into_iter().collect(),
            side_b: [deck(2), deck(3)].into_iter().collect(),
            curve: CrossfaderCurve::EqualPower,
            enabled: false,
        }
    }
}

impl CrossfaderConfig {
    /// Gain multiplier for one deck
    pub fn gain_for_deck(&self, deck: DeckId) -> f32 {
        if !self.enabled {
            return 1.0;
        }

        let p = self.position;
        let (a, b) = match self.curve {
            CrossfaderCurve::Linear => (1.0 - p, p),
            CrossfaderCurve::EqualPower => ((1.0 - p).sqrt(), p.sqrt()),
        };

        if self.side_a.contains(&deck) {
            a
        } else if self.side_b.contains(&deck) {
            b
        } else {
            1.0
        }
    }

    /// Gains for every deck, indexed by deck
    pub fn gains(&self) -> [f32; NUM_DECKS] {
        std::array::from_fn(|i| self.gain_for_deck(DeckId::from_array_index(i)))
    }

    /// Which side a deck is on
    pub fn side_of(&self, deck: DeckId) -> Side {
        if self.side_a.contains(&deck) {
            Side::A
        } else if self.side_b.contains(&deck) {
            Side::B
        } else {
            Side::None
        }
    }
}

/// Owns the crossfader configuration and keeps it valid
#[derive(Debug, Clone, Default)]
pub struct Crossfader {
    config: CrossfaderConfig,
}

impl Crossfader {
    /// Build from a stored config, rejecting overlapping sides
    pub fn new(config: CrossfaderConfig) -> EngineResult<Self> {
        let mut crossfader = Self::default();
        crossfader.set_sides(config.side_a, config.side_b)?;
        crossfader.set_position(config.position);
        crossfader.config.curve = config.curve;
        crossfader.config.enabled = config.enabled;
        Ok(crossfader)
    }

    pub fn get_config(&self) -> CrossfaderConfig {
        self.config.clone()
    }

    pub fn config(&self) -> &CrossfaderConfig {
        &self.config
    }

    /// Move the fader; clamped to 0.0-1.0 (NaN centers it)
    pub fn set_position(&mut self, position: f32) -> f32 {
        self.config.position = if position.is_nan() {
            0.5
        } else {
            position.clamp(0.0, 1.0)
        };
        self.config.position
    }

    pub fn set_curve(&mut self, curve: CrossfaderCurve) {
        self.config.curve = curve;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Replace both side assignments
    pub fn set_sides(
        &mut self,
        side_a: BTreeSet<DeckId>,
        side_b: BTreeSet<DeckId>,
    ) -> EngineResult<()> {
        let overlap: Vec<DeckId> = side_a.intersection(&side_b).copied().collect();
        if !overlap.is_empty() {
            return Err(EngineError::OverlappingSides(overlap));
        }
        self.config.side_a = side_a;
        self.config.side_b = side_b;
        Ok(())
    }

    /// Move a single deck to a side (or off both)
    pub fn assign_deck(&mut self, deck: DeckId, side: Side) {
        self.config.side_a.remove(&deck);
        self.config.side_b.remove(&deck);
        match side {
            Side::A => {
                self.config.side_a.insert(deck);
            }
            Side::B => {
                self.config.side_b.insert(deck);
            }
            Side::None => {}
        }
    }

    pub fn gain_for_deck(&self, deck: DeckId) -> f32 {
        self.config.gain_for_deck(deck)
    }

    pub fn gains(&self) -> [f32; NUM_DECKS] {
        self.config.gains()
    }
}
