//! MIDI controller state machine
//!
//! ```text
//! Disconnected ──connect──► Idle ──start_learn──► Learning
//!      ▲                     │  ◄──input / cancel──┘
//!      └────disconnect───────┘ (from any state)
//! ```
//!
//! Inputs arrive through [`MidiController::handle_input`] on the engine's
//! control thread, so a learn commit can never race a concurrent
//! `cancel_learn` or `disconnect`. Each connection gets a number; queued
//! input from a closed connection is discarded.

use std::path::{Path, PathBuf};

use crossbeam::channel::Sender;
use serde::Serialize;
use vizdeck_core::DeckId;

use crate::action::ActionKind;
use crate::connection::{MidiBackend, MidiInputEvent, MidiInputSender, MidiPortInfo};
use crate::error::{MidiError, MidiResult};
use crate::mapping::{MappingId, MappingTable, MidiMapping};
use crate::messages::MidiMessage;
use crate::presets::{self, MidiPreset};

/// Connection / learn state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiState {
    Disconnected,
    /// Connected, dispatching mapped input
    Idle,
    /// Connected, waiting for the control to bind
    Learning,
}

/// Pending binding while learning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnSession {
    pub action: ActionKind,
    pub name: String,
    pub deck: Option<DeckId>,
}

/// Snapshot for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MidiStatus {
    pub connected: bool,
    pub learning: bool,
    pub port_name: Option<String>,
    pub mapping_count: usize,
    /// Name of the mapping being learned
    pub pending_learn: Option<String>,
}

/// Outcome of one MIDI input
#[derive(Debug, Clone, PartialEq)]
pub enum MidiDispatch {
    /// A learn session completed with this new mapping
    Learned(MidiMapping),
    /// A mapping fired
    Action {
        mapping: MappingId,
        action: ActionKind,
        deck: Option<DeckId>,
        /// Transformed value for continuous actions, 1.0 for triggers
        value: f32,
    },
}

/// Owns the MIDI connection, the mapping table and the learn session
pub struct MidiController {
    backend: Box<dyn MidiBackend>,
    input_tx: Sender<MidiInputEvent>,
    /// Number of the open connection
    connection: Option<u64>,
    next_connection: u64,
    port_name: Option<String>,
    learn: Option<LearnSession>,
    table: MappingTable,
}

impl MidiController {
    /// Create a disconnected controller
    ///
    /// Input from connections opened later is queued on `input_tx`.
    pub fn new(backend: Box<dyn MidiBackend>, input_tx: Sender<MidiInputEvent>) -> Self {
        Self {
            backend,
            input_tx,
            connection: None,
            next_connection: 1,
            port_name: None,
            learn: None,
            table: MappingTable::new(),
        }
    }

    pub fn list_ports(&self) -> MidiResult<Vec<MidiPortInfo>> {
        self.backend.list_ports()
    }

    /// Open an input port
    pub fn connect(&mut self, port_index: usize) -> MidiResult<String> {
        if let Some(name) = &self.port_name {
            return Err(MidiError::PortUnavailable(format!(
                "already connected to {}",
                name
            )));
        }

        let connection = self.next_connection;
        self.next_connection += 1;
        let sender = MidiInputSender::new(self.input_tx.clone(), connection);
        let name = self.backend.connect(port_index, sender)?;

        self.connection = Some(connection);
        self.port_name = Some(name.clone());
        Ok(name)
    }

    /// Close the port and drop any learn session; always succeeds
    pub fn disconnect(&mut self) {
        if let Some(session) = self.learn.take() {
            log::info!("MIDI: Learn for '{}' cancelled by disconnect", session.name);
        }
        if self.connection.take().is_some() {
            self.backend.disconnect();
        }
        self.port_name = None;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn state(&self) -> MidiState {
        match (self.connection, &self.learn) {
            (None, _) => MidiState::Disconnected,
            (Some(_), None) => MidiState::Idle,
            (Some(_), Some(_)) => MidiState::Learning,
        }
    }

    pub fn status(&self) -> MidiStatus {
        MidiStatus {
            connected: self.is_connected(),
            learning: self.learn.is_some(),
            port_name: self.port_name.clone(),
            mapping_count: self.table.len(),
            pending_learn: self.learn.as_ref().map(|s| s.name.clone()),
        }
    }

    pub fn learn_session(&self) -> Option<&LearnSession> {
        self.learn.as_ref()
    }

    /// Bind the next incoming control to `action`
    pub fn start_learn(
        &mut self,
        action: ActionKind,
        name: impl Into<String>,
        deck: Option<DeckId>,
    ) -> MidiResult<()> {
        if !self.is_connected() {
            return Err(MidiError::NotConnected);
        }
        if let Some(session) = &self.learn {
            return Err(MidiError::LearnInProgress(session.name.clone()));
        }
        if action.needs_deck() && deck.is_none() {
            return Err(MidiError::MissingTargetDeck(action.to_string()));
        }

        let name = name.into();
        let name = if name.trim().is_empty() {
            action.to_string()
        } else {
            name
        };
        log::info!("MIDI: Learning '{}' ({})", name, action);
        self.learn = Some(LearnSession {
            action,
            name,
            deck: deck.filter(|_| action.needs_deck()),
        });
        Ok(())
    }

    /// Abandon learning; no-op when not learning
    pub fn cancel_learn(&mut self) {
        if let Some(session) = self.learn.take() {
            log::info!("MIDI: Cancelled learn for '{}'", session.name);
        }
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.table
    }

    /// Add a mapping under a fresh id
    pub fn add_mapping(&mut self, mut mapping: MidiMapping) -> MidiResult<MappingId> {
        if mapping.action.needs_deck() && mapping.target_deck.is_none() {
            return Err(MidiError::MissingTargetDeck(mapping.action.to_string()));
        }
        mapping.id = 0;
        self.table.insert(mapping)
    }

    pub fn remove_mapping(&mut self, id: MappingId) -> bool {
        self.table.remove(id)
    }

    pub fn clear_mappings(&mut self) {
        self.table.clear();
    }

    /// Replace the table with a built-in layout; returns its mapping count
    pub fn load_builtin_preset(&mut self, name: &str) -> MidiResult<usize> {
        let preset =
            presets::builtin_preset(name).ok_or_else(|| MidiError::UnknownPreset(name.to_string()))?;
        Ok(self.apply_preset(preset))
    }

    /// Save the current table as a preset file in `dir`
    pub fn save_preset(&self, name: &str, dir: &Path) -> MidiResult<PathBuf> {
        let preset = MidiPreset {
            name: name.to_string(),
            mappings: self.table.to_vec(),
            ..Default::default()
        };
        Ok(presets::save_preset_file(&preset, dir)?)
    }

    /// Replace the table with a preset file's mappings
    ///
    /// The table is untouched if the file cannot be read.
    pub fn load_preset_file(&mut self, path: &Path) -> MidiResult<usize> {
        let preset = presets::load_preset_file(path)?;
        Ok(self.apply_preset(preset))
    }

    fn apply_preset(&mut self, preset: MidiPreset) -> usize {
        let count = preset.mappings.len();
        self.table.replace(preset.mappings);
        log::info!("MIDI: Loaded preset '{}' ({} mappings)", preset.name, count);
        count
    }

    /// Process one queued input
    ///
    /// While learning, the first note or control change completes the
    /// session and yields [`MidiDispatch::Learned`]. Otherwise every
    /// matching mapping yields an action. Unmatched input yields nothing.
    pub fn handle_input(&mut self, event: &MidiInputEvent) -> Vec<MidiDispatch> {
        if self.connection != Some(event.connection) {
            return Vec::new();
        }
        let Some(message) = MidiMessage::parse(&event.data) else {
            return Vec::new();
        };

        if self.learn.is_some() {
            return self.complete_learn(&message).into_iter().collect();
        }

        self.table
            .matching(&message)
            .filter_map(|mapping| {
                let value = if mapping.action.is_continuous() {
                    mapping.output_value(&message)
                } else if message.is_press() {
                    1.0
                } else {
                    return None;
                };
                Some(MidiDispatch::Action {
                    mapping: mapping.id,
                    action: mapping.action,
                    deck: mapping.target_deck,
                    value,
                })
            })
            .collect()
    }

    fn complete_learn(&mut self, message: &MidiMessage) -> Option<MidiDispatch> {
        let (midi_type, channel, number) = MidiMapping::source_of(message)?;
        let session = self.learn.take()?;

        let mut mapping = MidiMapping::new(session.name, midi_type, channel, number, session.action);
        mapping.target_deck = session.deck;
        match self.table.insert(mapping) {
            Ok(id) => {
                let learned = self.table.get(id)?.clone();
                log::info!(
                    "MIDI: Learned '{}' -> {:?} ch{} #{}",
                    learned.display_name,
                    midi_type,
                    channel,
                    number
                );
                Some(MidiDispatch::Learned(learned))
            }
            Err(e) => {
                log::error!("MIDI: Failed to store learned mapping: {}", e);
                None
            }
        }
    }
}

impl Drop for MidiController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
