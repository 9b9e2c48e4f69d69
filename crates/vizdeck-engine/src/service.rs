//! EngineService - runs the orchestrator on its own thread
//!
//! Callers hold an [`EngineClient`] and make blocking calls; each call is
//! queued to the engine thread and answered over a oneshot channel. The
//! thread also wakes for renderer events, MIDI input, audio pump ticks and
//! timer deadlines, so every state change happens on that one thread.
//!
//! Device listings (audio devices, monitors, video outputs) are slow and
//! run on the calling thread instead; the engine keeps the results it
//! needs as a cache.
//!
//! ```text
//! ┌──────────────┐   EngineCommand   ┌──────────────────────────────┐
//! │ EngineClient │ ────────────────► │        vizdeck-engine        │
//! │  (any thread)│ ◄──────────────── │  select! over:               │
//! └──────────────┘   oneshot reply   │   commands, deck events,     │
//!        ▲                           │   MIDI input, pump tick,     │
//!        │ subscribe                 │   next deadline              │
//! ┌──────┴───────┐     publish       │        Orchestrator          │
//! │   EventBus   │ ◄──────────────── │                              │
//! └──────────────┘                   └──────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use tokio::sync::oneshot;
use vizdeck_core::audio::{self, AudioDevice, PumpReport};
use vizdeck_core::compositor::{BlendMode, CompositorConfig};
use vizdeck_core::crossfader::{CrossfaderConfig, CrossfaderCurve, Side};
use vizdeck_core::deck::{DeckEvent, StartOptions};
use vizdeck_core::playlist::{Playlist, PlaylistItem, PlaylistSettings};
use vizdeck_core::video::{video_output_listing, MonitorInfo, SinkCapabilities, SinkProbe};
use vizdeck_core::{DeckId, StereoLevels};
use vizdeck_midi::{midi_input_channel, MappingId, MidiInputEvent, MidiMapping, MidiPortInfo, MidiStatus};

use crate::config::EngineConfig;
use crate::error::{CommandError, CommandResult};
use crate::events::{EngineEvent, EventBus};
use crate::orchestrator::{EngineBackends, Orchestrator};
use crate::status::MultiDeckStatus;

type Job = Box<dyn FnOnce(&mut Orchestrator) + Send>;

/// Work queued to the engine thread
pub enum EngineCommand {
    /// Run against the orchestrator; the closure carries its own reply channel
    Call(Job),
    Shutdown,
}

/// The engine thread's state
pub struct EngineService {
    orchestrator: Orchestrator,
    command_rx: Receiver<EngineCommand>,
    deck_rx: Receiver<DeckEvent>,
    midi_rx: Receiver<MidiInputEvent>,
    frame_interval: Duration,
}

impl EngineService {
    /// Build the engine and start its thread
    pub fn spawn(config: EngineConfig, backends: EngineBackends) -> anyhow::Result<EngineHandle> {
        let events = EventBus::default();
        let (command_tx, command_rx) = channel::unbounded();
        let (deck_tx, deck_rx) = channel::unbounded();
        let (midi_tx, midi_rx) = midi_input_channel();

        let probe = Arc::clone(&backends.probe);
        let orchestrator = Orchestrator::new(config, backends, deck_tx, midi_tx, events.clone())
            .context("Failed to initialize engine")?;
        let capabilities = orchestrator.video_capabilities();

        let refresh_hz = orchestrator
            .config()
            .resolve_refresh_rate(&orchestrator.list_monitors());
        let frame_interval = Duration::from_secs_f32(1.0 / refresh_hz);

        let service = EngineService {
            orchestrator,
            command_rx,
            deck_rx,
            midi_rx,
            frame_interval,
        };

        let thread = thread::Builder::new()
            .name("vizdeck-engine".into())
            .spawn(move || service.run())
            .context("Failed to spawn engine thread")?;

        log::info!("Engine: started (pump cadence {:.1} Hz)", refresh_hz);
        Ok(EngineHandle {
            command_tx,
            events,
            probe,
            capabilities,
            thread: Some(thread),
        })
    }

    /// Main service loop
    fn run(mut self) {
        log::debug!("Engine: service loop running");
        let mut ticker = channel::never::<Instant>();
        let mut pumping = false;

        loop {
            let pump_active = self.orchestrator.pump_active();
            if pump_active != pumping {
                ticker = if pump_active {
                    channel::tick(self.frame_interval)
                } else {
                    channel::never()
                };
                pumping = pump_active;
                log::debug!("Engine: audio pump {}", if pumping { "running" } else { "idle" });
            }

            let deadline = match self.orchestrator.next_deadline(Instant::now()) {
                Some(at) => channel::at(at),
                None => channel::never(),
            };

            select! {
                recv(self.command_rx) -> msg => match msg {
                    Ok(EngineCommand::Call(job)) => job(&mut self.orchestrator),
                    Ok(EngineCommand::Shutdown) => {
                        log::info!("Engine: shutting down");
                        break;
                    }
                    Err(_) => {
                        log::info!("Engine: all clients gone, shutting down");
                        break;
                    }
                },
                recv(self.deck_rx) -> msg => {
                    if let Ok(event) = msg {
                        self.orchestrator.handle_deck_event(event);
                    }
                },
                recv(self.midi_rx) -> msg => {
                    if let Ok(event) = msg {
                        self.orchestrator.handle_midi(&event);
                    }
                },
                recv(ticker) -> _ => {
                    self.orchestrator.pump_audio();
                },
                recv(deadline) -> _ => {
                    self.orchestrator.tick(Instant::now());
                },
            }
        }

        self.orchestrator.shutdown();
    }
}

/// Owner's handle: hands out clients and stops the thread on drop
pub struct EngineHandle {
    command_tx: Sender<EngineCommand>,
    events: EventBus,
    probe: Arc<dyn SinkProbe>,
    capabilities: SinkCapabilities,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn client(&self) -> EngineClient {
        EngineClient {
            command_tx: self.command_tx.clone(),
            probe: Arc::clone(&self.probe),
            capabilities: self.capabilities,
        }
    }

    /// Receiver for engine events
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Check if the engine thread is still running
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the engine, killing every renderer, and wait for the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if thread.join().is_err() {
            log::error!("Engine: thread panicked");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Blocking command surface
///
/// Deck arguments are indices (0-3); anything else fails with an
/// `InvalidDeck` error. Must not be called from inside an async runtime.
#[derive(Clone)]
pub struct EngineClient {
    command_tx: Sender<EngineCommand>,
    probe: Arc<dyn SinkProbe>,
    capabilities: SinkCapabilities,
}

fn deck_id(index: usize) -> CommandResult<DeckId> {
    Ok(DeckId::new(index)?)
}

impl EngineClient {
    /// Run `f` on the engine thread and wait for its result
    fn call<T, F>(&self, f: F) -> CommandResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Orchestrator) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |engine| {
            let _ = tx.send(f(engine));
        });
        self.command_tx
            .send(EngineCommand::Call(job))
            .map_err(|_| CommandError::ServiceStopped)?;
        rx.blocking_recv().map_err(|_| CommandError::ServiceStopped)
    }

    fn try_call<T, E, F>(&self, f: F) -> CommandResult<T>
    where
        T: Send + 'static,
        E: Into<CommandError> + Send + 'static,
        F: FnOnce(&mut Orchestrator) -> Result<T, E> + Send + 'static,
    {
        self.call(f)?.map_err(Into::into)
    }

    /// Ask the engine to stop; the owner's handle joins the thread
    pub fn shutdown(&self) -> CommandResult<()> {
        self.command_tx
            .send(EngineCommand::Shutdown)
            .map_err(|_| CommandError::ServiceStopped)
    }

    // =========================================================================
    // Decks
    // =========================================================================

    /// Start a deck; `None` uses the configured render size
    pub fn start_deck(&self, deck: usize, options: Option<StartOptions>) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| {
            let options = options.unwrap_or_else(|| engine.default_start_options());
            engine.start_deck(deck, options)
        })
    }

    pub fn stop_deck(&self, deck: usize) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.stop_deck(deck))
    }

    pub fn toggle_fullscreen(&self, deck: usize) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.toggle_fullscreen(deck))
    }

    /// Returns the applied (clamped) volume
    pub fn set_deck_volume(&self, deck: usize, volume: f32) -> CommandResult<f32> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.set_deck_volume(deck, volume))
    }

    pub fn set_beat_sensitivity(&self, deck: usize, value: f32) -> CommandResult<f32> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.set_beat_sensitivity(deck, value))
    }

    pub fn load_preset(&self, deck: usize, path: impl Into<PathBuf>) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        let path = path.into();
        self.try_call(move |engine| engine.load_preset(deck, &path))
    }

    pub fn set_texture_paths(&self, paths: Vec<PathBuf>) -> CommandResult<()> {
        self.try_call(move |engine| engine.set_texture_paths(paths))
    }

    pub fn list_presets(&self, dir: Option<PathBuf>) -> CommandResult<Vec<PathBuf>> {
        self.call(move |engine| engine.list_presets(dir.as_deref()))
    }

    pub fn get_multi_deck_status(&self) -> CommandResult<MultiDeckStatus> {
        self.call(|engine| engine.get_multi_deck_status(Instant::now()))
    }

    /// Live config, for saving
    pub fn current_config(&self) -> CommandResult<EngineConfig> {
        self.call(|engine| engine.current_config())
    }

    // =========================================================================
    // Audio
    // =========================================================================

    pub fn start_audio(&self, device: Option<String>) -> CommandResult<()> {
        self.try_call(move |engine| engine.start_audio(device))
    }

    pub fn stop_audio(&self) -> CommandResult<()> {
        self.call(|engine| engine.stop_audio())
    }

    /// Pump one frame of audio (for frontends that drive the cadence)
    pub fn pump_audio(&self) -> CommandResult<PumpReport> {
        self.call(|engine| engine.pump_audio())
    }

    pub fn get_audio_levels(&self) -> CommandResult<StereoLevels> {
        self.call(|engine| engine.get_audio_levels())
    }

    /// Enumerated on the calling thread
    pub fn list_audio_devices(&self) -> CommandResult<Vec<AudioDevice>> {
        Ok(audio::list_audio_devices())
    }

    pub fn set_master_volume(&self, volume: f32) -> CommandResult<f32> {
        self.call(move |engine| engine.set_master_volume(volume))
    }

    // =========================================================================
    // Crossfader
    // =========================================================================

    pub fn crossfader_set_position(&self, position: f32) -> CommandResult<f32> {
        self.call(move |engine| engine.crossfader_set_position(position))
    }

    pub fn crossfader_set_enabled(&self, enabled: bool) -> CommandResult<()> {
        self.call(move |engine| engine.crossfader_set_enabled(enabled))
    }

    /// Curve by name: `linear` or `equal_power`
    pub fn crossfader_set_curve(&self, curve: &str) -> CommandResult<()> {
        let curve: CrossfaderCurve = curve.parse()?;
        self.call(move |engine| engine.crossfader_set_curve(curve))
    }

    pub fn crossfader_set_sides(&self, side_a: &[usize], side_b: &[usize]) -> CommandResult<()> {
        let side_a = side_a.iter().map(|&i| deck_id(i)).collect::<CommandResult<BTreeSet<_>>>()?;
        let side_b = side_b.iter().map(|&i| deck_id(i)).collect::<CommandResult<BTreeSet<_>>>()?;
        self.try_call(move |engine| engine.crossfader_set_sides(side_a, side_b))
    }

    /// Side by name: `a`, `b` or `none`
    pub fn crossfader_assign_deck(&self, deck: usize, side: &str) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        let side: Side = side.parse()?;
        self.call(move |engine| engine.crossfader_assign_deck(deck, side))
    }

    pub fn crossfader_get_config(&self) -> CommandResult<CrossfaderConfig> {
        self.call(|engine| engine.crossfader_get_config())
    }

    // =========================================================================
    // Compositor
    // =========================================================================

    pub fn compositor_set_enabled(&self, enabled: bool) -> CommandResult<()> {
        self.call(move |engine| engine.compositor_set_enabled(enabled))
    }

    pub fn compositor_set_resolution(&self, width: u32, height: u32) -> CommandResult<()> {
        self.try_call(move |engine| engine.compositor_set_resolution(width, height))
    }

    /// Returns the applied (clamped) opacity
    pub fn compositor_set_deck_opacity(&self, deck: usize, opacity: f32) -> CommandResult<f32> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.compositor_set_deck_opacity(deck, opacity))
    }

    /// Mode by name: `normal`, `add` (or `additive`), `multiply`, `screen`, `overlay`
    pub fn compositor_set_deck_blend_mode(&self, deck: usize, mode: &str) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        let mode: BlendMode = mode.parse()?;
        self.call(move |engine| engine.compositor_set_deck_blend_mode(deck, mode))
    }

    pub fn compositor_set_deck_layer(&self, deck: usize, layer_order: i32) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.call(move |engine| engine.compositor_set_deck_layer(deck, layer_order))
    }

    pub fn compositor_set_deck_enabled(&self, deck: usize, enabled: bool) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.call(move |engine| engine.compositor_set_deck_enabled(deck, enabled))
    }

    pub fn compositor_link_crossfader(&self, linked: bool) -> CommandResult<()> {
        self.call(move |engine| engine.compositor_link_crossfader(linked))
    }

    pub fn compositor_get_config(&self) -> CommandResult<CompositorConfig> {
        self.call(|engine| engine.compositor_get_config())
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    /// Append a preset; returns the new playlist length
    pub fn playlist_add(
        &self,
        deck: usize,
        path: impl Into<PathBuf>,
        name: Option<String>,
    ) -> CommandResult<usize> {
        let deck = deck_id(deck)?;
        let path = path.into();
        self.try_call(move |engine| engine.playlist_add(deck, &path, name))
    }

    pub fn playlist_remove(&self, deck: usize, index: usize) -> CommandResult<PlaylistItem> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_remove(deck, index))
    }

    pub fn playlist_clear(&self, deck: usize) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.call(move |engine| engine.playlist_clear(deck))
    }

    pub fn playlist_next(&self, deck: usize) -> CommandResult<Option<PlaylistItem>> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_next(deck))
    }

    pub fn playlist_previous(&self, deck: usize) -> CommandResult<Option<PlaylistItem>> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_previous(deck))
    }

    pub fn playlist_random(&self, deck: usize) -> CommandResult<Option<PlaylistItem>> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_random(deck))
    }

    pub fn playlist_jump_to(&self, deck: usize, index: usize) -> CommandResult<PlaylistItem> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_jump_to(deck, index))
    }

    pub fn playlist_set_settings(
        &self,
        deck: usize,
        settings: PlaylistSettings,
    ) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_set_settings(deck, settings))
    }

    pub fn playlist_reorder(&self, deck: usize, from: usize, to: usize) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.playlist_reorder(deck, from, to))
    }

    pub fn playlist_get(&self, deck: usize) -> CommandResult<Playlist> {
        let deck = deck_id(deck)?;
        self.call(move |engine| engine.playlist_get(deck))
    }

    // =========================================================================
    // MIDI
    // =========================================================================

    pub fn list_midi_ports(&self) -> CommandResult<Vec<MidiPortInfo>> {
        self.try_call(|engine| engine.list_midi_ports())
    }

    /// Returns the connected port's name
    pub fn midi_connect(&self, port_index: usize) -> CommandResult<String> {
        self.try_call(move |engine| engine.midi_connect(port_index))
    }

    pub fn midi_connect_by_name(&self, name: &str) -> CommandResult<String> {
        let name = name.to_string();
        self.try_call(move |engine| engine.midi_connect_by_name(&name))
    }

    pub fn midi_disconnect(&self) -> CommandResult<()> {
        self.call(|engine| engine.midi_disconnect())
    }

    pub fn midi_get_status(&self) -> CommandResult<MidiStatus> {
        self.call(|engine| engine.midi_get_status())
    }

    /// Learn a binding for a learn action name (`deck_volume`, `crossfader`, ...)
    pub fn midi_start_learn(
        &self,
        action: &str,
        name: &str,
        deck: Option<usize>,
    ) -> CommandResult<()> {
        let deck = deck.map(deck_id).transpose()?;
        let (action, name) = (action.to_string(), name.to_string());
        self.try_call(move |engine| engine.midi_start_learn(&action, &name, deck))
    }

    pub fn midi_cancel_learn(&self) -> CommandResult<()> {
        self.call(|engine| engine.midi_cancel_learn())
    }

    pub fn midi_get_mappings(&self) -> CommandResult<Vec<MidiMapping>> {
        self.call(|engine| engine.midi_get_mappings())
    }

    pub fn midi_add_mapping(&self, mapping: MidiMapping) -> CommandResult<MappingId> {
        self.try_call(move |engine| engine.midi_add_mapping(mapping))
    }

    pub fn midi_remove_mapping(&self, id: MappingId) -> CommandResult<()> {
        self.call(move |engine| engine.midi_remove_mapping(id))
    }

    pub fn midi_clear_mappings(&self) -> CommandResult<()> {
        self.call(|engine| engine.midi_clear_mappings())
    }

    pub fn midi_list_builtin_presets(&self) -> CommandResult<Vec<String>> {
        self.call(|engine| engine.midi_list_builtin_presets())
    }

    /// Returns the number of mappings loaded
    pub fn midi_load_builtin_preset(&self, name: &str) -> CommandResult<usize> {
        let name = name.to_string();
        self.try_call(move |engine| engine.midi_load_builtin_preset(&name))
    }

    pub fn midi_save_preset(&self, name: &str) -> CommandResult<PathBuf> {
        let name = name.to_string();
        self.try_call(move |engine| engine.midi_save_preset(&name))
    }

    pub fn midi_load_preset_file(&self, path: impl Into<PathBuf>) -> CommandResult<usize> {
        let path = path.into();
        self.try_call(move |engine| engine.midi_load_preset_file(&path))
    }

    pub fn midi_list_preset_files(&self) -> CommandResult<Vec<PathBuf>> {
        self.call(|engine| engine.midi_list_preset_files())
    }

    // =========================================================================
    // Video outputs
    // =========================================================================

    /// Probed on the calling thread; the engine's cache is refreshed
    pub fn list_video_outputs(&self) -> CommandResult<Vec<String>> {
        let outputs = video_output_listing(self.probe.as_ref(), self.capabilities);
        let cached = outputs.clone();
        self.call(move |engine| engine.set_video_outputs(cached))?;
        Ok(outputs)
    }

    /// Probed on the calling thread; the engine's cache is refreshed
    pub fn list_monitors(&self) -> CommandResult<Vec<MonitorInfo>> {
        let monitors = self.probe.monitors();
        let cached = monitors.clone();
        self.call(move |engine| engine.set_monitors(cached))?;
        Ok(monitors)
    }

    pub fn is_ndi_available(&self) -> CommandResult<bool> {
        self.call(|engine| engine.is_ndi_available())
    }

    /// Toggle a listed output: a loopback path, a `"<path>:<name>"` listing
    /// or `"Spout:<name>"`
    pub fn set_deck_video_output(
        &self,
        deck: usize,
        enabled: bool,
        device: Option<String>,
    ) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.set_deck_video_output(deck, enabled, device.as_deref()))
    }

    pub fn set_deck_ndi_output(
        &self,
        deck: usize,
        enabled: bool,
        name: Option<String>,
    ) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.set_deck_ndi_output(deck, enabled, name.as_deref()))
    }

    pub fn is_spout_available(&self) -> CommandResult<bool> {
        Ok(self.capabilities.spout)
    }

    pub fn set_deck_spout_output(
        &self,
        deck: usize,
        enabled: bool,
        name: Option<String>,
    ) -> CommandResult<()> {
        let deck = deck_id(deck)?;
        self.try_call(move |engine| engine.set_deck_spout_output(deck, enabled, name.as_deref()))
    }
}
