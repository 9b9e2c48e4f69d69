//! MIDI error types

use thiserror::Error;
use vizdeck_core::ErrorKind;

/// Errors from MIDI connection, learn mode and mapping management
#[derive(Error, Debug)]
pub enum MidiError {
    #[error("MIDI port unavailable: {0}")]
    PortUnavailable(String),

    #[error("No MIDI device connected")]
    NotConnected,

    #[error("MIDI learn already in progress for '{0}'")]
    LearnInProgress(String),

    #[error("Unknown MIDI preset: {0}")]
    UnknownPreset(String),

    #[error("Unknown MIDI action: {0}")]
    UnknownAction(String),

    #[error("MIDI action '{0}' needs a target deck")]
    MissingTargetDeck(String),

    #[error("Duplicate MIDI mapping id: {0}")]
    DuplicateMappingId(u64),

    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("MIDI preset file error: {0:#}")]
    PresetFile(#[from] anyhow::Error),
}

impl MidiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PortUnavailable(_) => ErrorKind::ResourceUnavailable,
            Self::NotConnected | Self::LearnInProgress(_) => ErrorKind::StateConflict,
            Self::UnknownPreset(_)
            | Self::UnknownAction(_)
            | Self::MissingTargetDeck(_)
            | Self::DuplicateMappingId(_) => ErrorKind::InvalidArgument,
            Self::Backend(_) => ErrorKind::TransientIo,
            Self::PresetFile(_) => ErrorKind::Fatal,
        }
    }
}

/// Result alias for MIDI operations
pub type MidiResult<T> = Result<T, MidiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(MidiError::NotConnected.kind(), ErrorKind::StateConflict);
        assert_eq!(
            MidiError::LearnInProgress("deck_volume".into()).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            MidiError::PortUnavailable("3".into()).kind(),
            ErrorKind::ResourceUnavailable
        );
        assert_eq!(
            MidiError::UnknownPreset("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
    }
}
