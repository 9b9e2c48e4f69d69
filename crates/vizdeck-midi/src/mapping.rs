//! Control-to-action mapping table

use serde::{Deserialize, Serialize};
use vizdeck_core::DeckId;

use crate::action::ActionKind;
use crate::error::{MidiError, MidiResult};
use crate::messages::MidiMessage;
use crate::transform::ValueTransform;

/// Mapping identifier, unique within a [`MappingTable`]
///
/// `0` means "not yet assigned"; the table issues ids starting at 1.
pub type MappingId = u64;

/// Kind of physical control a mapping listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiType {
    ControlChange,
    /// Matches both Note On and Note Off for the note number
    Note,
}

/// Binding of one physical control to an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiMapping {
    #[serde(default)]
    pub id: MappingId,
    pub display_name: String,
    pub midi_type: MidiType,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Controller number for CC, note number for notes
    pub number: u8,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_deck: Option<DeckId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<ValueTransform>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl MidiMapping {
    pub fn new(
        display_name: impl Into<String>,
        midi_type: MidiType,
        channel: u8,
        number: u8,
        action: ActionKind,
    ) -> Self {
        Self {
            id: 0,
            display_name: display_name.into(),
            midi_type,
            channel,
            number,
            action,
            target_deck: None,
            transform: action.default_transform(),
            enabled: true,
        }
    }

    /// Control Change mapping
    pub fn cc(name: impl Into<String>, channel: u8, controller: u8, action: ActionKind) -> Self {
        Self::new(name, MidiType::ControlChange, channel, controller, action)
    }

    /// Note mapping
    pub fn note(name: impl Into<String>, channel: u8, note: u8, action: ActionKind) -> Self {
        Self::new(name, MidiType::Note, channel, note, action)
    }

    pub fn with_deck(mut self, deck: DeckId) -> Self {
        self.target_deck = Some(deck);
        self
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Control address of a message, if it is a mappable control
    ///
    /// Only notes and control changes can be mapped.
    pub fn source_of(message: &MidiMessage) -> Option<(MidiType, u8, u8)> {
        match *message {
            MidiMessage::NoteOn { channel, note, .. } | MidiMessage::NoteOff { channel, note, .. } => {
                Some((MidiType::Note, channel, note))
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                ..
            } => Some((MidiType::ControlChange, channel, controller)),
            MidiMessage::ProgramChange { .. } | MidiMessage::PitchBend { .. } => None,
        }
    }

    /// Check if this mapping is enabled and listens to the message's control
    pub fn matches(&self, message: &MidiMessage) -> bool {
        self.enabled
            && Self::source_of(message) == Some((self.midi_type, self.channel, self.number))
    }

    /// Normalized message value after the mapping's transform
    pub fn output_value(&self, message: &MidiMessage) -> f32 {
        let value = message.value();
        match &self.transform {
            Some(transform) => transform.apply(value),
            None => value,
        }
    }
}

/// Ordered collection of mappings keyed by id
#[derive(Debug, Clone)]
pub struct MappingTable {
    mappings: Vec<MidiMapping>,
    next_id: MappingId,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            mappings: Vec::new(),
            next_id: 1,
        }
    }

    /// Insert a mapping
    ///
    /// A mapping with id `0` receives a fresh id. An explicit id must not
    /// already be present.
    pub fn insert(&mut self, mut mapping: MidiMapping) -> MidiResult<MappingId> {
        if mapping.id == 0 {
            mapping.id = self.fresh_id();
        } else if self.get(mapping.id).is_some() {
            return Err(MidiError::DuplicateMappingId(mapping.id));
        } else {
            self.next_id = self.next_id.max(mapping.id + 1);
        }
        let id = mapping.id;
        self.mappings.push(mapping);
        Ok(id)
    }

    /// Remove a mapping; returns whether it existed
    pub fn remove(&mut self, id: MappingId) -> bool {
        let before = self.mappings.len();
        self.mappings.retain(|m| m.id != id);
        self.mappings.len() < before
    }

    pub fn clear(&mut self) {
        self.mappings.clear();
    }

    /// Replace every mapping, issuing fresh ids
    ///
    /// Ids are never reused, so ids held from before the replacement
    /// cannot address the new mappings.
    pub fn replace(&mut self, mappings: Vec<MidiMapping>) {
        let mut fresh = Vec::with_capacity(mappings.len());
        for mut mapping in mappings {
            mapping.id = self.fresh_id();
            fresh.push(mapping);
        }
        self.mappings = fresh;
    }

    pub fn get(&self, id: MappingId) -> Option<&MidiMapping> {
        self.mappings.iter().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MidiMapping> {
        self.mappings.iter()
    }

    /// Enabled mappings bound to the message's control
    pub fn matching<'a>(
        &'a self,
        message: &'a MidiMessage,
    ) -> impl Iterator<Item = &'a MidiMapping> + 'a {
        self.mappings.iter().filter(move |m| m.matches(message))
    }

    pub fn to_vec(&self) -> Vec<MidiMapping> {
        self.mappings.clone()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn fresh_id(&mut self) -> MappingId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
