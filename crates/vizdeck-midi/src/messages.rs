//! Parsed MIDI channel messages

use midly::live::LiveEvent;
use midly::MidiMessage as RawMessage;

/// Channel voice message received from a controller
///
/// Channels are 0-15. Aftertouch, system and realtime messages are not
/// represented; [`MidiMessage::parse`] returns `None` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// 14-bit bend, 8192 is center
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse raw bytes from the driver
    ///
    /// Note On with velocity 0 is reported as Note Off.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(data).ok()? else {
            return None;
        };
        let channel = channel.as_int();

        let parsed = match message {
            RawMessage::NoteOn { key, vel } if vel.as_int() == 0 => Self::NoteOff {
                channel,
                note: key.as_int(),
                velocity: 0,
            },
            RawMessage::NoteOn { key, vel } => Self::NoteOn {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            },
            RawMessage::NoteOff { key, vel } => Self::NoteOff {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            },
            RawMessage::Controller { controller, value } => Self::ControlChange {
                channel,
                controller: controller.as_int(),
                value: value.as_int(),
            },
            RawMessage::ProgramChange { program } => Self::ProgramChange {
                channel,
                program: program.as_int(),
            },
            RawMessage::PitchBend { bend } => Self::PitchBend {
                channel,
                value: bend.0.as_int(),
            },
            _ => return None,
        };
        Some(parsed)
    }

    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::PitchBend { channel, .. } => channel,
        }
    }

    /// Normalized value (0.0-1.0)
    pub fn value(&self) -> f32 {
        match *self {
            Self::NoteOn { velocity, .. } => velocity as f32 / 127.0,
            Self::NoteOff { .. } => 0.0,
            Self::ControlChange { value, .. } => value as f32 / 127.0,
            Self::ProgramChange { .. } => 1.0,
            Self::PitchBend { value, .. } => value as f32 / 16383.0,
        }
    }

    /// Check if this is a "press" event (Note On or CC above center)
    pub fn is_press(&self) -> bool {
        match *self {
            Self::NoteOn { velocity, .. } => velocity > 0,
            Self::ControlChange { value, .. } => value >= 64,
            Self::ProgramChange { .. } => true,
            Self::NoteOff { .. } | Self::PitchBend { .. } => false,
        }
    }
}
