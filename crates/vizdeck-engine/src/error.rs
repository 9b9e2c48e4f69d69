//! Errors returned to engine callers

use thiserror::Error;
use vizdeck_core::audio::AudioError;
use vizdeck_core::{EngineError, ErrorKind};
use vizdeck_midi::MidiError;

/// Failure of an engine command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Midi(#[from] MidiError),

    #[error("Engine service is not running")]
    ServiceStopped,
}

impl From<AudioError> for CommandError {
    fn from(e: AudioError) -> Self {
        Self::Engine(e.into())
    }
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(e) => e.kind(),
            Self::Midi(e) => e.kind(),
            Self::ServiceStopped => ErrorKind::Fatal,
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
