//! MIDI port discovery and connection
//!
//! Uses midir for cross-platform MIDI input (ALSA on Linux, CoreMIDI on
//! macOS, WinMM on Windows). The driver callback only forwards raw bytes
//! into a bounded channel drained by the engine's control thread.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use midir::{MidiInput, MidiInputConnection};
use serde::{Deserialize, Serialize};

use crate::error::{MidiError, MidiResult};

/// Capacity of the callback -> engine queue
pub const INPUT_QUEUE_CAPACITY: usize = 256;

const CLIENT_NAME: &str = "vizdeck";

/// Raw MIDI bytes tagged with the connection they arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiInputEvent {
    pub connection: u64,
    pub data: Vec<u8>,
}

/// Create the bounded queue MIDI input is funneled through
pub fn midi_input_channel() -> (Sender<MidiInputEvent>, Receiver<MidiInputEvent>) {
    channel::bounded(INPUT_QUEUE_CAPACITY)
}

/// Callback-side handle for one connection
#[derive(Debug, Clone)]
pub struct MidiInputSender {
    tx: Sender<MidiInputEvent>,
    connection: u64,
}

impl MidiInputSender {
    pub fn new(tx: Sender<MidiInputEvent>, connection: u64) -> Self {
        Self { tx, connection }
    }

    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// Queue a message without blocking the driver thread
    ///
    /// Returns false if the message was dropped.
    pub fn send(&self, data: &[u8]) -> bool {
        let event = MidiInputEvent {
            connection: self.connection,
            data: data.to_vec(),
        };
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("MIDI: input queue full, dropping message");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// An available MIDI input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// MIDI input device access
pub trait MidiBackend: Send {
    /// Enumerate input ports
    fn list_ports(&self) -> MidiResult<Vec<MidiPortInfo>>;

    /// Open a port, delivering its messages to `input`
    ///
    /// Returns the port name.
    fn connect(&mut self, port_index: usize, input: MidiInputSender) -> MidiResult<String>;

    /// Close the open port, if any
    fn disconnect(&mut self);
}

/// Production backend over midir
#[derive(Default)]
pub struct MidirBackend {
    connection: Option<MidiInputConnection<()>>,
}

impl MidirBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_input() -> MidiResult<MidiInput> {
        MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Backend(e.to_string()))
    }
}

impl MidiBackend for MidirBackend {
    fn list_ports(&self) -> MidiResult<Vec<MidiPortInfo>> {
        let midi_in = Self::open_input()?;
        let ports = midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| MidiPortInfo { index, name })
            })
            .collect();
        Ok(ports)
    }

    fn connect(&mut self, port_index: usize, input: MidiInputSender) -> MidiResult<String> {
        let midi_in = Self::open_input()?;
        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| MidiError::PortUnavailable(format!("no input port at index {}", port_index)))?;

        let port_name = midi_in
            .port_name(port)
            .map_err(|e| MidiError::PortUnavailable(e.to_string()))?;

        let connection = midi_in
            .connect(
                port,
                "vizdeck-midi-input",
                move |_timestamp, data, _| {
                    input.send(data);
                },
                (),
            )
            .map_err(|e| MidiError::PortUnavailable(format!("{}: {}", port_name, e)))?;

        log::info!("MIDI: Connected to input port: {}", port_name);
        self.connection = Some(connection);
        Ok(port_name)
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::info!("MIDI: Disconnected from input port");
        }
    }
}
