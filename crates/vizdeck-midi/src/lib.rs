//! MIDI controller support for vizdeck
//!
//! This crate provides:
//! - MIDI port discovery and input via midir
//! - MIDI message parsing via midly
//! - A control-to-action mapping table with value transforms
//! - Learn mode: bind the next physical control to a chosen action
//! - Built-in controller layouts and YAML preset files
//!
//! # Architecture
//!
//! ```text
//! MIDI Device → midir callback → crossbeam channel → engine loop → MidiController::handle_input
//! ```
//!
//! The midir callback runs on a driver thread and never touches controller
//! state. It only forwards raw bytes; the engine's control thread owns the
//! [`MidiController`] and is the single writer of the mapping table and the
//! learn session.

mod action;
mod connection;
mod controller;
mod error;
mod mapping;
mod messages;
mod presets;
mod transform;

pub use action::{ActionKind, LEARNABLE_ACTIONS};
pub use connection::{
    midi_input_channel, MidiBackend, MidiInputEvent, MidiInputSender, MidirBackend, MidiPortInfo,
    INPUT_QUEUE_CAPACITY,
};
pub use controller::{LearnSession, MidiController, MidiDispatch, MidiState, MidiStatus};
pub use error::{MidiError, MidiResult};
pub use mapping::{MappingId, MappingTable, MidiMapping, MidiType};
pub use messages::MidiMessage;
pub use presets::{
    builtin_preset, builtin_preset_names, list_preset_files, load_preset_file, save_preset_file,
    MidiPreset, PRESET_FILE_EXTENSION,
};
pub use transform::{TransformCurve, ValueTransform};
