//! Engine error types
//!
//! Every error carries an [`ErrorKind`] so callers can decide how to react
//! without matching on individual variants.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::audio::AudioError;
use crate::types::{DeckId, NUM_DECKS};
use crate::video::SinkKind;

/// Coarse error classification shared by every vizdeck crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad index, path or id. Caller error, never retried.
    InvalidArgument,
    /// Operation not valid in the current state machine state
    StateConflict,
    /// Device, port or sink absent until external remediation
    ResourceUnavailable,
    /// Spawn hiccup or single I/O failure
    TransientIo,
    /// Worker crash or corrupted state
    Fatal,
}

/// Errors returned by deck, playlist, crossfader, audio and video operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid deck ID: {0}. Must be 0-{max}", max = NUM_DECKS - 1)]
    InvalidDeck(usize),

    #[error("Deck {0} is already running")]
    AlreadyRunning(DeckId),

    #[error("Deck {0} is not running")]
    NotRunning(DeckId),

    #[error("Invalid preset: {}", .0.display())]
    InvalidPreset(PathBuf),

    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Decks {0:?} assigned to both crossfader sides")]
    OverlappingSides(Vec<DeckId>),

    #[error("Cycle duration {0}s must be between 5 and 300 seconds")]
    InvalidCycleDuration(u64),

    #[error("Unknown crossfader curve: {0}")]
    UnknownCurve(String),

    #[error("Unknown crossfader side: {0}")]
    UnknownSide(String),

    #[error("Unknown blend mode: {0}")]
    UnknownBlendMode(String),

    #[error("Output resolution {width}x{height} must be between 1x1 and 7680x4320")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Opacity {0} is not a number between 0 and 1")]
    InvalidOpacity(f32),

    #[error("{0} output is not available on this system")]
    SinkUnavailable(SinkKind),

    #[error("No {0} sink selected for deck {1}")]
    NoSinkSelected(SinkKind, DeckId),

    #[error("Renderer executable not found (searched {searched:?})")]
    RendererNotFound { searched: Vec<PathBuf> },

    #[error("Failed to start renderer for deck {deck}: {source}")]
    Spawn {
        deck: DeckId,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer for deck {deck} did not accept command: {reason}")]
    WorkerIo { deck: DeckId, reason: String },

    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl EngineError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDeck(_)
            | Self::InvalidPreset(_)
            | Self::IndexOutOfRange { .. }
            | Self::OverlappingSides(_)
            | Self::InvalidCycleDuration(_)
            | Self::UnknownCurve(_)
            | Self::UnknownSide(_)
            | Self::UnknownBlendMode(_)
            | Self::InvalidResolution { .. }
            | Self::InvalidOpacity(_) => ErrorKind::InvalidArgument,
            Self::AlreadyRunning(_) | Self::NotRunning(_) | Self::NoSinkSelected(..) => {
                ErrorKind::StateConflict
            }
            Self::SinkUnavailable(_) | Self::RendererNotFound { .. } => {
                ErrorKind::ResourceUnavailable
            }
            Self::Spawn { .. } | Self::WorkerIo { .. } => ErrorKind::TransientIo,
            Self::Audio(e) => e.kind(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
