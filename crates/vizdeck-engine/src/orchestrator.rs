//! Orchestrator - single owner of all engine state
//!
//! Decks, playlists, the crossfader, the compositor, the audio pump, the
//! MIDI mapping table and the video routing all live here and are only ever
//! mutated through `&mut self`. The service thread drives it from commands,
//! worker events, MIDI input, pump ticks and timer deadlines; tests drive it
//! directly.
//!
//! Monitor and video output listings are gathered by the caller (they shell
//! out to xrandr and walk sysfs) and handed in; the orchestrator only keeps
//! the latest copy.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use rand::Rng;
use vizdeck_core::audio::{AudioPump, CaptureBackend, PumpReport, SystemCapture};
use vizdeck_core::compositor::{BlendMode, Compositor, CompositorConfig};
use vizdeck_core::crossfader::{Crossfader, CrossfaderConfig, CrossfaderCurve, Side};
use vizdeck_core::deck::{
    list_presets, validate_preset, DeckEvent, DeckEventSender, DeckManager, DeckState,
    DeckTransition, ProcessLauncher, RendererCommand, StartOptions, WorkerLauncher,
};
use vizdeck_core::playlist::{Playlist, PlaylistItem, PlaylistScheduler, PlaylistSettings};
use vizdeck_core::video::{
    video_output_listing, MonitorInfo, SinkCapabilities, SinkKind, SinkProbe, SystemProbe,
    VideoOutputRouter,
};
use vizdeck_core::{DeckId, EngineError, EngineResult, StereoLevels};
use vizdeck_midi::{
    builtin_preset_names, list_preset_files, ActionKind, MappingId, MidiBackend, MidiController,
    MidiDispatch, MidiError, MidiInputEvent, MidiMapping, MidiPortInfo, MidiResult, MidiStatus,
    MidirBackend,
};

use crate::config::EngineConfig;
use crate::error::CommandResult;
use crate::events::{EngineEvent, EventBus};
use crate::status::{AudioStatus, DeckStatus, MultiDeckStatus, PlaylistSummary};

/// How often live renderers are polled for exit
pub const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Device-facing seams, swapped for fakes in tests
pub struct EngineBackends {
    pub launcher: Box<dyn WorkerLauncher>,
    pub capture: Box<dyn CaptureBackend>,
    pub midi: Box<dyn MidiBackend>,
    /// Shared with clients, which run the listings on their own thread
    pub probe: Arc<dyn SinkProbe>,
}

impl EngineBackends {
    /// Real processes, audio devices, MIDI ports and sinks
    pub fn system(config: &EngineConfig) -> Self {
        Self {
            launcher: Box::new(ProcessLauncher::new(config.renderer_path.clone())),
            capture: Box::new(SystemCapture::new()),
            midi: Box::new(MidirBackend::new()),
            probe: Arc::new(SystemProbe),
        }
    }
}

/// Playlist movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Previous,
    Random,
    Jump(usize),
}

pub struct Orchestrator {
    config: EngineConfig,
    decks: DeckManager,
    scheduler: PlaylistScheduler,
    crossfader: Crossfader,
    compositor: Compositor,
    audio: AudioPump,
    midi: MidiController,
    video: VideoOutputRouter,
    monitors: Vec<MonitorInfo>,
    video_outputs: Vec<String>,
    events: EventBus,
    master_volume: f32,
}

impl Orchestrator {
    /// Build the engine state from a sanitized config
    ///
    /// Probes sinks, monitors and loopback devices once, on the calling
    /// thread. Renderer events are delivered on `deck_events`, MIDI input on
    /// `midi_input`; whoever owns the receivers feeds them back through
    /// [`Orchestrator::handle_deck_event`] and [`Orchestrator::handle_midi`].
    pub fn new(
        config: EngineConfig,
        backends: EngineBackends,
        deck_events: DeckEventSender,
        midi_input: Sender<MidiInputEvent>,
        events: EventBus,
    ) -> EngineResult<Self> {
        let crossfader = Crossfader::new(config.crossfader.clone())?;
        let compositor = Compositor::new(config.compositor.clone())?;

        let mut decks =
            DeckManager::new(backends.launcher, deck_events).with_stop_grace(config.stop_grace());
        for deck in DeckId::all() {
            let playlist = decks.playlist_mut(deck);
            let settings = PlaylistSettings {
                cycle_secs: config.default_cycle_secs,
                ..playlist.settings()
            };
            playlist.apply_settings(settings)?;
        }
        decks.set_texture_paths(config.texture_paths.clone())?;

        let capabilities = backends.probe.capabilities();
        let video = VideoOutputRouter::new(capabilities);
        let monitors = backends.probe.monitors();
        let video_outputs = video_output_listing(backends.probe.as_ref(), capabilities);

        Ok(Self {
            audio: AudioPump::new(backends.capture, config.audio.clone()),
            midi: MidiController::new(backends.midi, midi_input),
            scheduler: PlaylistScheduler::new(),
            master_volume: 1.0,
            config,
            decks,
            crossfader,
            compositor,
            video,
            monitors,
            video_outputs,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Config reflecting the live crossfader, compositor, audio device and
    /// texture paths
    pub fn current_config(&self) -> EngineConfig {
        EngineConfig {
            crossfader: self.crossfader.get_config(),
            compositor: self.compositor.get_config(),
            audio: self.audio.config().clone(),
            texture_paths: self.decks.texture_paths().to_vec(),
            ..self.config.clone()
        }
    }

    /// Start options built from the configured render size
    pub fn default_start_options(&self) -> StartOptions {
        StartOptions {
            width: self.config.width,
            height: self.config.height,
            ..StartOptions::default()
        }
    }

    // =========================================================================
    // Decks
    // =========================================================================

    /// Launch a deck's renderer; it becomes Running once the worker reports ready
    ///
    /// A monitor index is checked against the cached monitor list.
    pub fn start_deck(&mut self, deck: DeckId, options: StartOptions) -> EngineResult<()> {
        if let Some(index) = options.monitor_index {
            let count = self.monitors.len();
            if index >= count {
                return Err(EngineError::IndexOutOfRange { index, len: count });
            }
        }
        self.decks.start(deck, options)?;
        self.publish_state(deck);
        Ok(())
    }

    /// Request a stop; a stopped deck is left alone
    pub fn stop_deck(&mut self, deck: DeckId) -> EngineResult<()> {
        self.scheduler.cancel(deck);
        let before = self.decks.deck(deck).state.clone();
        match self.decks.stop(deck, Instant::now()) {
            Some(transition) => self.apply_transition(transition, Instant::now()),
            None if self.decks.deck(deck).state != before => self.publish_state(deck),
            None => {}
        }
        Ok(())
    }

    pub fn toggle_fullscreen(&mut self, deck: DeckId) -> EngineResult<()> {
        self.decks.toggle_fullscreen(deck)
    }

    pub fn set_deck_volume(&mut self, deck: DeckId, volume: f32) -> EngineResult<f32> {
        self.decks.set_volume(deck, volume)
    }

    pub fn set_beat_sensitivity(&mut self, deck: DeckId, value: f32) -> EngineResult<f32> {
        self.decks.set_beat_sensitivity(deck, value)
    }

    /// Load a preset now, or queue it for the next start
    pub fn load_preset(&mut self, deck: DeckId, path: &Path) -> EngineResult<()> {
        self.decks.load_preset(deck, path)
    }

    pub fn set_texture_paths(&mut self, paths: Vec<PathBuf>) -> EngineResult<()> {
        self.decks.set_texture_paths(paths)
    }

    /// Presets under `dir`, or under the configured preset directory
    pub fn list_presets(&self, dir: Option<&Path>) -> Vec<PathBuf> {
        list_presets(dir.unwrap_or(self.config.preset_dir.as_path()))
    }

    /// Snapshot of every deck and shared control
    pub fn get_multi_deck_status(&self, now: Instant) -> MultiDeckStatus {
        let decks = self
            .decks
            .decks()
            .map(|deck| DeckStatus {
                id: deck.id,
                state: deck.state.clone(),
                preset: deck.preset.clone(),
                volume: deck.volume,
                beat_sensitivity: deck.beat_sensitivity,
                uptime_secs: deck.uptime(now).as_secs(),
                crash_count: deck.crash_count(),
                playlist: PlaylistSummary::new(&deck.playlist, self.scheduler.is_armed(deck.id)),
                outputs: self.video.outputs(deck.id).clone(),
            })
            .collect();

        MultiDeckStatus {
            decks,
            crossfader: self.crossfader.get_config(),
            compositor: self.compositor.get_config(),
            audio: AudioStatus {
                enabled: self.audio.is_enabled(),
                device: self.audio.config().device.clone(),
                levels: self.audio.levels(),
                consecutive_failures: self.audio.health().consecutive_failures(),
            },
            master_volume: self.master_volume,
            midi: self.midi.status(),
            ndi_available: self.video.is_ndi_available(),
            loopback_available: self.video.is_available(SinkKind::Loopback),
            spout_available: self.video.is_available(SinkKind::Spout),
        }
    }

    // =========================================================================
    // Audio
    // =========================================================================

    pub fn start_audio(&mut self, device: Option<String>) -> EngineResult<()> {
        self.audio.start(device)?;
        Ok(())
    }

    pub fn stop_audio(&mut self) {
        self.audio.stop();
    }

    /// One pump tick; a completed failure streak is published once
    pub fn pump_audio(&mut self) -> PumpReport {
        let gains = self.crossfader.gains();
        let report = self.audio.pump(&mut self.decks, &gains, self.master_volume);
        if let Some(warning) = &report.warning {
            self.events.publish(EngineEvent::AudioWarning(warning.clone()));
        }
        report
    }

    pub fn get_audio_levels(&self) -> StereoLevels {
        self.audio.levels()
    }

    /// Set the master volume, clamped to 0.0-1.0
    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.master_volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        self.master_volume
    }

    /// Whether the service loop should run pump ticks
    pub fn pump_active(&self) -> bool {
        self.config.internal_pump && self.audio.is_enabled() && self.decks.any_running()
    }

    // =========================================================================
    // Crossfader
    // =========================================================================

    // Every setter resyncs layers; linked opacity follows the gains

    pub fn crossfader_set_position(&mut self, position: f32) -> f32 {
        let position = self.crossfader.set_position(position);
        self.sync_layers();
        position
    }

    pub fn crossfader_set_enabled(&mut self, enabled: bool) {
        self.crossfader.set_enabled(enabled);
        self.sync_layers();
    }

    pub fn crossfader_set_curve(&mut self, curve: CrossfaderCurve) {
        self.crossfader.set_curve(curve);
        self.sync_layers();
    }

    pub fn crossfader_set_sides(
        &mut self,
        side_a: BTreeSet<DeckId>,
        side_b: BTreeSet<DeckId>,
    ) -> EngineResult<()> {
        self.crossfader.set_sides(side_a, side_b)?;
        self.sync_layers();
        Ok(())
    }

    pub fn crossfader_assign_deck(&mut self, deck: DeckId, side: Side) {
        self.crossfader.assign_deck(deck, side);
        self.sync_layers();
    }

    pub fn crossfader_get_config(&self) -> CrossfaderConfig {
        self.crossfader.get_config()
    }

    // =========================================================================
    // Compositor
    // =========================================================================

    pub fn compositor_set_enabled(&mut self, enabled: bool) {
        self.compositor.set_enabled(enabled);
        log::info!("Compositor: {}", if enabled { "enabled" } else { "disabled" });
        self.sync_layers();
    }

    /// Output frame size; not sent to renderers, which draw at their own size
    pub fn compositor_set_resolution(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.compositor.set_resolution(width, height)
    }

    /// Returns the applied (clamped) opacity
    pub fn compositor_set_deck_opacity(&mut self, deck: DeckId, opacity: f32) -> EngineResult<f32> {
        let opacity = self.compositor.set_deck_opacity(deck, opacity)?;
        self.sync_layers();
        Ok(opacity)
    }

    pub fn compositor_set_deck_blend_mode(&mut self, deck: DeckId, mode: BlendMode) {
        self.compositor.set_deck_blend_mode(deck, mode);
        self.sync_layers();
    }

    pub fn compositor_set_deck_layer(&mut self, deck: DeckId, layer_order: i32) {
        self.compositor.set_deck_layer(deck, layer_order);
        self.sync_layers();
    }

    pub fn compositor_set_deck_enabled(&mut self, deck: DeckId, enabled: bool) {
        self.compositor.set_deck_enabled(deck, enabled);
        self.sync_layers();
    }

    pub fn compositor_link_crossfader(&mut self, linked: bool) {
        self.compositor.set_link_to_crossfader(linked);
        self.sync_layers();
    }

    pub fn compositor_get_config(&self) -> CompositorConfig {
        self.compositor.get_config()
    }

    /// Send each running renderer its layer, where it changed
    fn sync_layers(&mut self) {
        for deck in DeckId::all() {
            let Some(state) = self.compositor.pending(deck, self.crossfader.config()) else {
                continue;
            };
            match self.decks.forward(deck, &state.command()) {
                Ok(true) => self.compositor.mark_sent(deck, state),
                Ok(false) => {}
                Err(e) => log::warn!("Deck {}: layer update failed: {}", deck, e),
            }
        }
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    /// Append a preset; the name defaults to the file stem
    ///
    /// Returns the new playlist length.
    pub fn playlist_add(
        &mut self,
        deck: DeckId,
        path: &Path,
        name: Option<String>,
    ) -> EngineResult<usize> {
        let path = validate_preset(path)?;
        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let playlist = self.decks.playlist_mut(deck);
        playlist.add(name, path);
        let len = playlist.len();

        if !self.scheduler.is_armed(deck) {
            self.rearm(deck, Instant::now());
        }
        Ok(len)
    }

    pub fn playlist_remove(&mut self, deck: DeckId, index: usize) -> EngineResult<PlaylistItem> {
        let removed = self.decks.playlist_mut(deck).remove(index)?;
        if self.decks.deck(deck).playlist.is_empty() {
            self.scheduler.cancel(deck);
        }
        Ok(removed)
    }

    pub fn playlist_clear(&mut self, deck: DeckId) {
        self.decks.playlist_mut(deck).clear();
        self.scheduler.cancel(deck);
    }

    pub fn playlist_next(&mut self, deck: DeckId) -> EngineResult<Option<PlaylistItem>> {
        self.advance(deck, Step::Next, Instant::now())
    }

    pub fn playlist_previous(&mut self, deck: DeckId) -> EngineResult<Option<PlaylistItem>> {
        self.advance(deck, Step::Previous, Instant::now())
    }

    pub fn playlist_random(&mut self, deck: DeckId) -> EngineResult<Option<PlaylistItem>> {
        self.advance(deck, Step::Random, Instant::now())
    }

    pub fn playlist_jump_to(&mut self, deck: DeckId, index: usize) -> EngineResult<PlaylistItem> {
        self.advance(deck, Step::Jump(index), Instant::now())?
            .ok_or(EngineError::IndexOutOfRange { index, len: 0 })
    }

    /// Apply shuffle / auto-cycle / cycle duration; the timer restarts
    pub fn playlist_set_settings(
        &mut self,
        deck: DeckId,
        settings: PlaylistSettings,
    ) -> EngineResult<()> {
        self.decks.playlist_mut(deck).apply_settings(settings)?;
        self.rearm(deck, Instant::now());
        Ok(())
    }

    pub fn playlist_reorder(&mut self, deck: DeckId, from: usize, to: usize) -> EngineResult<()> {
        self.decks.playlist_mut(deck).reorder(from, to)
    }

    pub fn playlist_get(&self, deck: DeckId) -> Playlist {
        self.decks.deck(deck).playlist.clone()
    }

    /// Move through the playlist and load the new item
    ///
    /// Stopped decks keep the item as their start preset. Running decks
    /// restart their auto-cycle timer.
    fn advance(
        &mut self,
        deck: DeckId,
        step: Step,
        now: Instant,
    ) -> EngineResult<Option<PlaylistItem>> {
        let playlist = self.decks.playlist_mut(deck);
        let item = match step {
            Step::Next => self.scheduler.next(playlist),
            Step::Previous => self.scheduler.previous(playlist),
            Step::Random => self.scheduler.random(playlist),
            Step::Jump(index) => Some(self.scheduler.jump_to(playlist, index)?),
        };

        if let Some(item) = &item {
            let loaded = self.decks.load_preset(deck, &item.path);
            self.rearm(deck, now);
            loaded?;
        }
        Ok(item)
    }

    /// Arm a running deck's timer from `now`; other decks have none
    fn rearm(&mut self, deck: DeckId, now: Instant) {
        if self.decks.is_running(deck) {
            let playlist = &self.decks.deck(deck).playlist;
            self.scheduler.arm(deck, playlist, now);
        } else {
            self.scheduler.cancel(deck);
        }
    }

    /// Step the deck's preset: through its playlist, else through the library
    fn step_preset(&mut self, deck: DeckId, step: Step) -> EngineResult<()> {
        if !self.decks.deck(deck).playlist.is_empty() {
            self.advance(deck, step, Instant::now())?;
            return Ok(());
        }

        let library = self.list_presets(None);
        if library.is_empty() {
            log::debug!("Deck {}: no presets in {:?}", deck, self.config.preset_dir);
            return Ok(());
        }
        let len = library.len();
        let current = self
            .decks
            .deck(deck)
            .preset
            .as_ref()
            .and_then(|preset| library.iter().position(|p| p == preset));
        let index = match (step, current) {
            (Step::Next, Some(i)) => (i + 1) % len,
            (Step::Next, None) => 0,
            (Step::Previous, Some(i)) => (i + len - 1) % len,
            (Step::Previous, None) => len - 1,
            (Step::Random, _) => rand::thread_rng().gen_range(0..len),
            (Step::Jump(index), _) => index,
        };
        let path = library
            .get(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })?;
        self.decks.load_preset(deck, path)
    }

    // =========================================================================
    // MIDI
    // =========================================================================

    pub fn list_midi_ports(&self) -> MidiResult<Vec<MidiPortInfo>> {
        self.midi.list_ports()
    }

    pub fn midi_connect(&mut self, port_index: usize) -> MidiResult<String> {
        self.midi.connect(port_index)
    }

    /// Connect to the first port whose name contains `name` (case-insensitive)
    pub fn midi_connect_by_name(&mut self, name: &str) -> MidiResult<String> {
        let needle = name.to_lowercase();
        let port = self
            .midi
            .list_ports()?
            .into_iter()
            .find(|port| port.name.to_lowercase().contains(&needle))
            .ok_or_else(|| MidiError::PortUnavailable(format!("no port matching '{}'", name)))?;
        self.midi.connect(port.index)
    }

    pub fn midi_disconnect(&mut self) {
        self.midi.disconnect();
    }

    pub fn midi_get_status(&self) -> MidiStatus {
        self.midi.status()
    }

    /// Bind the next control moved to the learn action named `action`
    pub fn midi_start_learn(
        &mut self,
        action: &str,
        name: &str,
        deck: Option<DeckId>,
    ) -> MidiResult<()> {
        let kind = ActionKind::from_learn_name(action)
            .ok_or_else(|| MidiError::UnknownAction(action.to_string()))?;
        self.midi.start_learn(kind, name, deck)
    }

    pub fn midi_cancel_learn(&mut self) {
        self.midi.cancel_learn();
    }

    pub fn midi_get_mappings(&self) -> Vec<MidiMapping> {
        self.midi.mappings().to_vec()
    }

    pub fn midi_add_mapping(&mut self, mapping: MidiMapping) -> MidiResult<MappingId> {
        self.midi.add_mapping(mapping)
    }

    /// Remove a mapping; absent ids are fine
    pub fn midi_remove_mapping(&mut self, id: MappingId) {
        if !self.midi.remove_mapping(id) {
            log::debug!("MIDI: no mapping {} to remove", id);
        }
    }

    pub fn midi_clear_mappings(&mut self) {
        self.midi.clear_mappings();
    }

    pub fn midi_list_builtin_presets(&self) -> Vec<String> {
        builtin_preset_names().into_iter().map(str::to_string).collect()
    }

    pub fn midi_load_builtin_preset(&mut self, name: &str) -> MidiResult<usize> {
        self.midi.load_builtin_preset(name)
    }

    /// Save the mapping table into the MIDI preset directory
    pub fn midi_save_preset(&self, name: &str) -> MidiResult<PathBuf> {
        self.midi.save_preset(name, &self.config.midi.preset_dir)
    }

    pub fn midi_load_preset_file(&mut self, path: &Path) -> MidiResult<usize> {
        self.midi.load_preset_file(path)
    }

    pub fn midi_list_preset_files(&self) -> Vec<PathBuf> {
        list_preset_files(&self.config.midi.preset_dir)
    }

    /// Process one queued MIDI message
    pub fn handle_midi(&mut self, event: &MidiInputEvent) {
        for dispatch in self.midi.handle_input(event) {
            match dispatch {
                MidiDispatch::Learned(mapping) => {
                    self.events.publish(EngineEvent::MidiLearned(mapping));
                }
                MidiDispatch::Action {
                    mapping,
                    action,
                    deck,
                    value,
                } => {
                    if let Err(e) = self.run_action(action, deck, value) {
                        log::warn!("MIDI: mapping {} ({}) failed: {}", mapping, action, e);
                    }
                }
            }
        }
    }

    fn run_action(
        &mut self,
        action: ActionKind,
        deck: Option<DeckId>,
        value: f32,
    ) -> CommandResult<()> {
        let target = || deck.ok_or_else(|| MidiError::MissingTargetDeck(action.to_string()));

        match action {
            ActionKind::DeckStart => {
                let options = self.default_start_options();
                self.start_deck(target()?, options)?;
            }
            ActionKind::DeckStop => self.stop_deck(target()?)?,
            ActionKind::DeckToggle => {
                let deck = target()?;
                if self.decks.deck(deck).state == DeckState::Stopped {
                    let options = self.default_start_options();
                    self.start_deck(deck, options)?;
                } else {
                    self.stop_deck(deck)?;
                }
            }
            ActionKind::DeckVolume => {
                self.set_deck_volume(target()?, value)?;
            }
            ActionKind::BeatSensitivity => {
                self.set_beat_sensitivity(target()?, value)?;
            }
            ActionKind::NextPreset => self.step_preset(target()?, Step::Next)?,
            ActionKind::PreviousPreset => self.step_preset(target()?, Step::Previous)?,
            ActionKind::RandomPreset => self.step_preset(target()?, Step::Random)?,
            ActionKind::LoadPresetByIndex { index } => {
                self.step_preset(target()?, Step::Jump(index))?
            }
            ActionKind::PlaylistNext => {
                self.playlist_next(target()?)?;
            }
            ActionKind::PlaylistPrevious => {
                self.playlist_previous(target()?)?;
            }
            ActionKind::ShuffleToggle => {
                let deck = target()?;
                let mut settings = self.decks.deck(deck).playlist.settings();
                settings.shuffle = !settings.shuffle;
                self.playlist_set_settings(deck, settings)?;
            }
            ActionKind::AutoCycleToggle => {
                let deck = target()?;
                let mut settings = self.decks.deck(deck).playlist.settings();
                settings.auto_cycle = !settings.auto_cycle;
                self.playlist_set_settings(deck, settings)?;
            }
            ActionKind::Crossfader => {
                self.crossfader_set_position(value);
            }
            ActionKind::CrossfaderCurveToggle => {
                let curve = self.crossfader.config().curve.toggled();
                self.crossfader_set_curve(curve);
            }
            ActionKind::CrossfaderEnableToggle => {
                let enabled = !self.crossfader.config().enabled;
                self.crossfader_set_enabled(enabled);
            }
            ActionKind::MasterVolume => {
                self.set_master_volume(value);
            }
            ActionKind::ToggleFullscreen => self.toggle_fullscreen(target()?)?,
            ActionKind::VideoOutputToggle => {
                let deck = target()?;
                let sink = &self.video.outputs(deck).loopback;
                let enable = !sink.enabled;
                let device = match &sink.target {
                    Some(_) => None,
                    None => self.list_video_outputs().into_iter().next(),
                };
                self.set_deck_video_output(deck, enable, device.as_deref())?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Video outputs
    // =========================================================================

    /// Cached output listing: loopback devices as `"<path>:<name>"`, then
    /// `"Spout:<sender>"` where Spout exists
    pub fn list_video_outputs(&self) -> Vec<String> {
        self.video_outputs.clone()
    }

    pub fn set_video_outputs(&mut self, outputs: Vec<String>) {
        self.video_outputs = outputs;
    }

    /// Cached monitor list
    pub fn list_monitors(&self) -> Vec<MonitorInfo> {
        self.monitors.clone()
    }

    pub fn set_monitors(&mut self, monitors: Vec<MonitorInfo>) {
        self.monitors = monitors;
    }

    pub fn video_capabilities(&self) -> SinkCapabilities {
        self.video.capabilities()
    }

    pub fn is_ndi_available(&self) -> bool {
        self.video.is_ndi_available()
    }

    pub fn is_spout_available(&self) -> bool {
        self.video.is_available(SinkKind::Spout)
    }

    /// Toggle a listed output; `"Spout:<name>"` selects the Spout sink,
    /// anything else a loopback device
    pub fn set_deck_video_output(
        &mut self,
        deck: DeckId,
        enabled: bool,
        device: Option<&str>,
    ) -> EngineResult<()> {
        let kind = device.map_or(SinkKind::Loopback, SinkKind::from_descriptor);
        self.set_sink(deck, kind, enabled, device)
    }

    pub fn set_deck_spout_output(
        &mut self,
        deck: DeckId,
        enabled: bool,
        name: Option<&str>,
    ) -> EngineResult<()> {
        self.set_sink(deck, SinkKind::Spout, enabled, name)
    }

    pub fn set_deck_ndi_output(
        &mut self,
        deck: DeckId,
        enabled: bool,
        name: Option<&str>,
    ) -> EngineResult<()> {
        self.set_sink(deck, SinkKind::Ndi, enabled, name)
    }

    fn set_sink(
        &mut self,
        deck: DeckId,
        kind: SinkKind,
        enabled: bool,
        descriptor: Option<&str>,
    ) -> EngineResult<()> {
        let change = self.video.prepare(deck, kind, enabled, descriptor)?;
        self.decks.forward(deck, &change.command())?;
        self.video.apply(change);
        Ok(())
    }

    // =========================================================================
    // Events and timers
    // =========================================================================

    /// Apply a renderer status event
    pub fn handle_deck_event(&mut self, event: DeckEvent) {
        if let Some(transition) = self.decks.handle_event(event) {
            self.apply_transition(transition, Instant::now());
        }
    }

    /// Reap exited renderers and fire due auto-cycle timers
    pub fn tick(&mut self, now: Instant) {
        for transition in self.decks.reap(now) {
            self.apply_transition(transition, now);
        }

        for deck in self.scheduler.take_due(now) {
            // A timer racing a stop has nothing left to advance
            if !self.decks.is_running(deck) {
                continue;
            }
            match self.advance(deck, Step::Next, now) {
                Ok(Some(item)) => log::info!("Deck {}: auto-cycled to '{}'", deck, item.name),
                Ok(None) => {}
                Err(e) => log::warn!("Deck {}: auto-cycle failed: {}", deck, e),
            }
        }
    }

    /// When the loop must next call [`Orchestrator::tick`]
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let reap = self
            .decks
            .has_live_workers()
            .then(|| now + REAP_INTERVAL);
        [self.scheduler.next_deadline(), self.decks.next_deadline(), reap]
            .into_iter()
            .flatten()
            .min()
    }

    fn apply_transition(&mut self, transition: DeckTransition, now: Instant) {
        match transition {
            DeckTransition::Running(deck) => {
                let mut replay = self.video.replay_commands(deck);
                replay.push(RendererCommand::SetVolume {
                    volume: self.decks.deck(deck).volume,
                });
                if !self.decks.texture_paths().is_empty() {
                    replay.push(RendererCommand::SetTexturePaths {
                        paths: self.decks.texture_paths().to_vec(),
                    });
                }
                for command in &replay {
                    if let Err(e) = self.decks.forward(deck, command) {
                        log::warn!("Deck {}: failed to restore output settings: {}", deck, e);
                    }
                }
                self.compositor.forget(deck);
                self.sync_layers();
                self.rearm(deck, now);
                self.publish_state(deck);
            }
            DeckTransition::Stopped(deck) | DeckTransition::Faulted(deck, _) => {
                self.scheduler.cancel(deck);
                self.compositor.forget(deck);
                self.publish_state(deck);
            }
            DeckTransition::PresetLoaded(deck, path) => {
                self.events.publish(EngineEvent::PresetChanged { deck, path });
            }
        }
    }

    fn publish_state(&self, deck: DeckId) {
        self.events.publish(EngineEvent::DeckStateChanged {
            deck,
            state: self.decks.deck(deck).state.clone(),
        });
    }

    /// Stop capture, close MIDI and kill every renderer
    pub fn shutdown(&mut self) {
        if self.audio.is_enabled() {
            self.audio.stop();
        }
        self.midi.disconnect();
        self.decks.shutdown();
        for deck in DeckId::all() {
            self.scheduler.cancel(deck);
        }
        log::info!("Engine: shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_backends, preset, Fakes};
    use crossbeam::channel::{self, Receiver};
    use vizdeck_core::deck::WorkerEvent;
    use vizdeck_midi::midi_input_channel;

    struct Harness {
        engine: Orchestrator,
        fakes: Fakes,
        events: Receiver<EngineEvent>,
        midi_rx: Receiver<MidiInputEvent>,
        _deck_rx: Receiver<DeckEvent>,
    }

    impl Harness {
        fn with(config: EngineConfig, capabilities: SinkCapabilities) -> Self {
            let (backends, fakes) = fake_backends(capabilities);
            let (deck_tx, deck_rx) = channel::unbounded();
            let (midi_tx, midi_rx) = midi_input_channel();
            let bus = EventBus::new(64);
            let events = bus.subscribe();
            let engine = Orchestrator::new(config, backends, deck_tx, midi_tx, bus).unwrap();
            Self {
                engine,
                fakes,
                events,
                midi_rx,
                _deck_rx: deck_rx,
            }
        }

        fn new() -> Self {
            Self::with(
                EngineConfig::default(),
                SinkCapabilities {
                    loopback: true,
                    ndi: false,
                    spout: false,
                },
            )
        }

        fn running(&mut self, deck: DeckId) {
            let options = self.engine.default_start_options();
            self.engine.start_deck(deck, options).unwrap();
            let ready = self.fakes.launcher.event(deck, WorkerEvent::Ready);
            self.engine.handle_deck_event(ready);
            assert!(self.engine.decks.is_running(deck));
        }

        /// Deliver everything the fake controller queued
        fn drain_midi(&mut self) {
            while let Ok(event) = self.midi_rx.try_recv() {
                self.engine.handle_midi(&event);
            }
        }

        fn drain_events(&self) -> Vec<EngineEvent> {
            self.events.try_iter().collect()
        }

        fn state(&self, deck: DeckId) -> DeckState {
            self.engine.decks.deck(deck).state.clone()
        }
    }

    fn deck(i: usize) -> DeckId {
        DeckId::new(i).unwrap()
    }

    #[test]
    fn test_deck_lifecycle_publishes_states() {
        let mut h = Harness::new();
        let d0 = deck(0);

        let options = h.engine.default_start_options();
        h.engine.start_deck(d0, options).unwrap();
        assert_eq!(h.state(d0), DeckState::Starting);
        assert_eq!(h.fakes.launcher.config(d0).width, 1280);

        h.engine
            .handle_deck_event(h.fakes.launcher.event(d0, WorkerEvent::Ready));
        assert_eq!(h.state(d0), DeckState::Running);

        h.engine.stop_deck(d0).unwrap();
        assert_eq!(h.state(d0), DeckState::Stopping);
        h.engine.tick(Instant::now());
        assert_eq!(h.state(d0), DeckState::Stopped);

        let states: Vec<DeckState> = h
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::DeckStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                DeckState::Starting,
                DeckState::Running,
                DeckState::Stopping,
                DeckState::Stopped
            ]
        );
    }

    #[test]
    fn test_stop_on_stopped_deck_is_noop() {
        let mut h = Harness::new();
        h.engine.stop_deck(deck(1)).unwrap();
        assert_eq!(h.state(deck(1)), DeckState::Stopped);
        assert!(h.drain_events().is_empty());
    }

    #[test]
    fn test_crash_faults_one_deck_only() {
        let mut h = Harness::new();
        h.running(deck(0));
        h.running(deck(1));

        h.fakes.launcher.worker(deck(0)).crash(139);
        h.engine.tick(Instant::now());

        assert!(matches!(h.state(deck(0)), DeckState::Faulted(_)));
        assert_eq!(h.state(deck(1)), DeckState::Running);
        let status = h.engine.get_multi_deck_status(Instant::now());
        assert_eq!(status.deck(deck(0)).unwrap().crash_count, 1);
        assert_eq!(status.running_count(), 1);

        h.engine.stop_deck(deck(0)).unwrap();
        assert_eq!(h.state(deck(0)), DeckState::Stopped);
    }

    #[test]
    fn test_crossfader_center_equal_power() {
        let mut h = Harness::new();
        h.engine.crossfader_set_enabled(true);
        h.engine.crossfader_set_position(0.5);
        for gain in h.engine.crossfader_get_config().gains() {
            assert!((gain - 0.5f32.sqrt()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_pump_scales_by_crossfader_and_master() {
        let mut h = Harness::new();
        h.running(deck(0));
        h.engine.start_audio(None).unwrap();
        assert!(h.engine.pump_active());

        h.engine.crossfader_set_enabled(true);
        h.engine.crossfader_set_position(0.0);
        h.engine.set_master_volume(0.5);

        let report = h.engine.pump_audio();
        assert_eq!(report.sent, 1);
        let audio = h
            .fakes
            .launcher
            .worker(deck(0))
            .sent()
            .into_iter()
            .rev()
            .find_map(|command| match command {
                RendererCommand::Audio { samples } => Some(samples),
                _ => None,
            })
            .unwrap();
        assert_eq!(audio, vec![0.25, -0.125, 0.25, -0.125]);
        assert_eq!(h.engine.get_audio_levels(), StereoLevels::new(0.5, 0.25));
    }

    #[test]
    fn test_pump_failures_warn_once_per_streak() {
        let mut h = Harness::new();
        h.running(deck(0));
        h.engine.start_audio(None).unwrap();
        h.fakes.capture.set_failing(true);

        let warnings = |h: &Harness| {
            h.drain_events()
                .into_iter()
                .filter(|event| matches!(event, EngineEvent::AudioWarning(_)))
                .count()
        };

        for _ in 0..4 {
            h.engine.pump_audio();
        }
        assert_eq!(warnings(&h), 0);
        h.engine.pump_audio();
        assert_eq!(warnings(&h), 1);
        h.engine.pump_audio();
        assert_eq!(warnings(&h), 0);

        h.fakes.capture.set_failing(false);
        h.engine.pump_audio();
        h.fakes.capture.set_failing(true);
        for _ in 0..5 {
            h.engine.pump_audio();
        }
        assert_eq!(warnings(&h), 1);
    }

    #[test]
    fn test_pump_idle_without_running_decks() {
        let mut h = Harness::new();
        h.engine.start_audio(None).unwrap();
        assert!(!h.engine.pump_active());
        assert_eq!(h.engine.pump_audio().sent, 0);
    }

    #[test]
    fn test_playlist_wraps_and_queues_for_stopped_deck() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new();
        let d = deck(0);
        for name in ["a.milk", "b.milk", "c.milk"] {
            h.engine.playlist_add(d, &preset(dir.path(), name), None).unwrap();
        }

        assert_eq!(h.engine.playlist_next(d).unwrap().unwrap().name, "b");
        assert_eq!(h.engine.playlist_next(d).unwrap().unwrap().name, "c");
        assert_eq!(h.engine.playlist_next(d).unwrap().unwrap().name, "a");
        assert_eq!(h.engine.playlist_previous(d).unwrap().unwrap().name, "c");

        // Stopped deck starts with the selected item
        let options = h.engine.default_start_options();
        h.engine.start_deck(d, options).unwrap();
        assert_eq!(
            h.fakes.launcher.config(d).preset_path,
            Some(dir.path().join("c.milk"))
        );
    }

    #[test]
    fn test_playlist_add_rejects_non_presets() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "").unwrap();
        let err = h.engine.playlist_add(deck(0), &notes, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPreset(_)));
        assert!(h.engine.playlist_get(deck(0)).is_empty());
    }

    #[test]
    fn test_remove_only_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new();
        let d = deck(2);
        h.engine
            .playlist_add(d, &preset(dir.path(), "solo.milk"), Some("Solo".into()))
            .unwrap();
        let removed = h.engine.playlist_remove(d, 0).unwrap();
        assert_eq!(removed.name, "Solo");

        let playlist = h.engine.playlist_get(d);
        assert!(playlist.is_empty());
        assert_eq!(playlist.current_index(), 0);
        assert!(matches!(
            h.engine.playlist_jump_to(d, 0),
            Err(EngineError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_auto_cycle_fires_only_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new();
        let d = deck(1);
        h.engine.playlist_add(d, &preset(dir.path(), "one.milk"), None).unwrap();
        h.engine.playlist_add(d, &preset(dir.path(), "two.milk"), None).unwrap();
        h.engine
            .playlist_set_settings(
                d,
                PlaylistSettings {
                    shuffle: false,
                    auto_cycle: true,
                    cycle_secs: 5,
                },
            )
            .unwrap();
        // Not running yet, so no timer
        assert!(!h.engine.scheduler.is_armed(d));

        h.running(d);
        assert!(h.engine.scheduler.is_armed(d));

        let now = Instant::now();
        h.engine.tick(now + Duration::from_secs(6));
        assert_eq!(h.engine.playlist_get(d).current_index(), 1);
        assert!(h
            .fakes
            .launcher
            .worker(d)
            .sent()
            .contains(&RendererCommand::LoadPreset {
                path: dir.path().join("two.milk")
            }));
        assert!(h.engine.scheduler.is_armed(d));

        h.engine.stop_deck(d).unwrap();
        assert!(!h.engine.scheduler.is_armed(d));
        h.engine.tick(now + Duration::from_secs(60));
        assert_eq!(h.engine.playlist_get(d).current_index(), 1);
    }

    #[test]
    fn test_invalid_cycle_duration_rejected() {
        let mut h = Harness::new();
        let err = h
            .engine
            .playlist_set_settings(
                deck(0),
                PlaylistSettings {
                    shuffle: true,
                    auto_cycle: true,
                    cycle_secs: 301,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), vizdeck_core::ErrorKind::InvalidArgument);
        assert!(!h.engine.playlist_get(deck(0)).shuffle);
    }

    #[test]
    fn test_default_cycle_applied_to_playlists() {
        let config = EngineConfig {
            default_cycle_secs: 45,
            ..EngineConfig::default()
        };
        let h = Harness::with(config, SinkCapabilities::default());
        for d in DeckId::all() {
            assert_eq!(h.engine.playlist_get(d).settings().cycle_secs, 45);
        }
    }

    #[test]
    fn test_learn_creates_one_mapping_then_dispatches() {
        let mut h = Harness::new();
        h.engine.midi_connect(0).unwrap();
        h.engine
            .midi_start_learn("deck_volume", "Deck 1 Volume", Some(deck(0)))
            .unwrap();
        assert!(matches!(
            h.engine.midi_start_learn("crossfader", "Fader", None),
            Err(MidiError::LearnInProgress(_))
        ));

        // Two controls moved before the loop drains: only the first binds
        h.fakes.midi.play(&[0xB0, 7, 64]);
        h.fakes.midi.play(&[0xB0, 8, 64]);
        h.drain_midi();

        let mappings = h.engine.midi_get_mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].number, 7);
        assert!(h
            .drain_events()
            .iter()
            .any(|event| matches!(event, EngineEvent::MidiLearned(m) if m.number == 7)));

        h.fakes.midi.play(&[0xB0, 7, 0]);
        h.drain_midi();
        assert_eq!(h.engine.decks.deck(deck(0)).volume, 0.0);
    }

    #[test]
    fn test_learn_requires_connection_and_known_action() {
        let mut h = Harness::new();
        assert!(matches!(
            h.engine.midi_start_learn("crossfader", "Fader", None),
            Err(MidiError::NotConnected)
        ));
        h.engine.midi_connect(0).unwrap();
        assert!(matches!(
            h.engine.midi_start_learn("warp_drive", "?", None),
            Err(MidiError::UnknownAction(_))
        ));
        h.engine.midi_cancel_learn();
        assert!(!h.engine.midi_get_status().learning);
    }

    #[test]
    fn test_midi_crossfader_and_deck_toggle() {
        let mut h = Harness::new();
        h.engine.midi_connect(0).unwrap();
        h.engine
            .midi_add_mapping(MidiMapping::cc("Fader", 0, 8, ActionKind::Crossfader))
            .unwrap();
        h.engine
            .midi_add_mapping(
                MidiMapping::note("Play 2", 0, 36, ActionKind::DeckToggle).with_deck(deck(1)),
            )
            .unwrap();

        h.fakes.midi.play(&[0xB0, 8, 127]);
        h.fakes.midi.play(&[0x90, 36, 100]);
        // Release does not toggle again
        h.fakes.midi.play(&[0x80, 36, 0]);
        h.drain_midi();

        assert_eq!(h.engine.crossfader_get_config().position, 1.0);
        assert_eq!(h.state(deck(1)), DeckState::Starting);
    }

    #[test]
    fn test_builtin_preset_replaces_table() {
        let mut h = Harness::new();
        h.engine
            .midi_add_mapping(MidiMapping::cc("Fader", 0, 8, ActionKind::Crossfader))
            .unwrap();
        let count = h.engine.midi_load_builtin_preset("APC").unwrap();
        assert!(count > 0);
        assert_eq!(h.engine.midi_get_mappings().len(), count);
        assert!(matches!(
            h.engine.midi_load_builtin_preset("theremin"),
            Err(MidiError::UnknownPreset(_))
        ));
        assert!(h
            .engine
            .midi_list_builtin_presets()
            .contains(&"Generic DJ Controller".to_string()));
    }

    #[test]
    fn test_midi_preset_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.midi.preset_dir = dir.path().to_path_buf();
        let mut h = Harness::with(config, SinkCapabilities::default());

        h.engine.midi_load_builtin_preset("nanokontrol2").unwrap();
        let saved = h.engine.midi_get_mappings();
        let path = h.engine.midi_save_preset("My Kontrol").unwrap();
        assert_eq!(h.engine.midi_list_preset_files(), vec![path.clone()]);

        h.engine.midi_clear_mappings();
        assert_eq!(h.engine.midi_load_preset_file(&path).unwrap(), saved.len());
    }

    #[test]
    fn test_ndi_unavailable_and_sinks_replayed() {
        let mut h = Harness::new();
        let d = deck(3);
        assert!(!h.engine.is_ndi_available());
        let err = h.engine.set_deck_ndi_output(d, true, Some("Stage")).unwrap_err();
        assert_eq!(err.kind(), vizdeck_core::ErrorKind::ResourceUnavailable);

        assert!(matches!(
            h.engine.set_deck_video_output(d, true, None),
            Err(EngineError::NoSinkSelected(..))
        ));
        let outputs = h.engine.list_video_outputs();
        assert_eq!(outputs, vec!["/dev/video10:Vizdeck Loopback".to_string()]);
        h.engine
            .set_deck_video_output(d, true, Some(&outputs[0]))
            .unwrap();

        h.running(d);
        assert!(h
            .fakes
            .launcher
            .worker(d)
            .sent()
            .contains(&RendererCommand::SetVideoOutput {
                enabled: true,
                device_path: Some("/dev/video10".to_string()),
            }));
    }

    #[test]
    fn test_midi_video_toggle_picks_first_device() {
        let mut h = Harness::new();
        let d = deck(0);
        h.engine.midi_connect(0).unwrap();
        h.engine
            .midi_add_mapping(
                MidiMapping::note("Out", 0, 40, ActionKind::VideoOutputToggle).with_deck(d),
            )
            .unwrap();

        h.fakes.midi.play(&[0x90, 40, 127]);
        h.drain_midi();
        let status = h.engine.get_multi_deck_status(Instant::now());
        let loopback = &status.deck(d).unwrap().outputs.loopback;
        assert!(loopback.enabled);
        assert_eq!(loopback.target.as_deref(), Some("/dev/video10"));
    }

    #[test]
    fn test_next_deadline_tracks_workers_and_timers() {
        let mut h = Harness::new();
        let now = Instant::now();
        assert_eq!(h.engine.next_deadline(now), None);

        h.running(deck(0));
        assert_eq!(h.engine.next_deadline(now), Some(now + REAP_INTERVAL));
    }

    #[test]
    fn test_status_snapshot() {
        let mut h = Harness::new();
        assert_eq!(h.engine.set_deck_volume(deck(2), 0.25).unwrap(), 0.25);
        // Kept for the next start
        h.running(deck(2));
        assert!(h
            .fakes
            .launcher
            .worker(deck(2))
            .sent()
            .contains(&RendererCommand::SetVolume { volume: 0.25 }));
        h.engine.set_beat_sensitivity(deck(2), 9.0).unwrap();
        h.engine.set_master_volume(2.0);

        let status = h.engine.get_multi_deck_status(Instant::now());
        assert_eq!(status.decks.len(), 4);
        let d2 = status.deck(deck(2)).unwrap();
        assert_eq!(d2.volume, 0.25);
        assert_eq!(d2.beat_sensitivity, 5.0);
        assert_eq!(d2.playlist.name, "Untitled");
        assert_eq!(status.master_volume, 1.0);
        assert!(!status.audio.enabled);
        assert!(!status.midi.connected);
        assert!(status.loopback_available);
        assert!(!status.ndi_available);
        assert!(!status.spout_available);
        assert!(!status.compositor.enabled);
    }

    #[test]
    fn test_refused_sink_command_leaves_routing_unchanged() {
        let mut h = Harness::new();
        let d = deck(1);
        h.running(d);
        h.fakes.launcher.worker(d).break_pipe();

        let err = h
            .engine
            .set_deck_video_output(d, true, Some("/dev/video10:Vizdeck Loopback"))
            .unwrap_err();
        assert_eq!(err.kind(), vizdeck_core::ErrorKind::TransientIo);

        let status = h.engine.get_multi_deck_status(Instant::now());
        let loopback = &status.deck(d).unwrap().outputs.loopback;
        assert!(!loopback.enabled);
        assert_eq!(loopback.target, None);
    }

    #[test]
    fn test_monitor_index_checked_against_cache() {
        let mut h = Harness::new();
        assert_eq!(h.engine.list_monitors().len(), 1);
        let probed = h.fakes.probe.callers().len();

        let options = StartOptions {
            monitor_index: Some(1),
            ..h.engine.default_start_options()
        };
        assert!(matches!(
            h.engine.start_deck(deck(0), options.clone()),
            Err(EngineError::IndexOutOfRange { index: 1, len: 1 })
        ));

        let mut monitors = h.engine.list_monitors();
        monitors.push(MonitorInfo {
            index: 1,
            name: "FAKE-2".into(),
            is_primary: false,
            ..monitors[0].clone()
        });
        h.engine.set_monitors(monitors);
        h.engine.start_deck(deck(0), options).unwrap();
        assert_eq!(h.fakes.launcher.config(deck(0)).monitor_index, Some(1));
        assert_eq!(h.fakes.probe.callers().len(), probed);
    }

    #[test]
    fn test_spout_output_follows_platform_support() {
        let mut h = Harness::new();
        let err = h
            .engine
            .set_deck_video_output(deck(0), true, Some("Spout:Vizdeck"))
            .unwrap_err();
        assert!(matches!(err, EngineError::SinkUnavailable(SinkKind::Spout)));
        assert!(!h.engine.list_video_outputs().iter().any(|o| o.starts_with("Spout:")));

        let mut h = Harness::with(
            EngineConfig::default(),
            SinkCapabilities {
                loopback: false,
                ndi: false,
                spout: true,
            },
        );
        let outputs = h.engine.list_video_outputs();
        assert_eq!(outputs, vec!["Spout:Vizdeck".to_string()]);

        let d = deck(2);
        h.running(d);
        h.engine.set_deck_video_output(d, true, Some(&outputs[0])).unwrap();
        assert_eq!(
            h.fakes.launcher.worker(d).sent().last(),
            Some(&RendererCommand::SetSpoutOutput {
                enabled: true,
                name: Some("Vizdeck".to_string()),
            })
        );
        h.engine.set_deck_spout_output(d, false, None).unwrap();
        assert!(!h.engine.get_multi_deck_status(Instant::now()).deck(d).unwrap().outputs.spout.enabled);
    }

    fn layers(h: &Harness, d: DeckId) -> Vec<(bool, f32, BlendMode, i32)> {
        h.fakes
            .launcher
            .worker(d)
            .sent()
            .into_iter()
            .filter_map(|command| match command {
                RendererCommand::SetLayer {
                    composited,
                    opacity,
                    blend_mode,
                    layer_order,
                } => Some((composited, opacity, blend_mode, layer_order)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_layer_sent_on_start_and_on_change() {
        let mut h = Harness::new();
        let d = deck(1);
        h.running(d);
        assert_eq!(layers(&h, d), vec![(false, 1.0, BlendMode::Normal, 1)]);

        h.engine.compositor_set_enabled(true);
        h.engine.compositor_set_deck_blend_mode(d, BlendMode::Screen);
        h.engine.compositor_set_deck_layer(d, 7);
        // Unchanged settings are not resent
        h.engine.compositor_set_deck_layer(d, 7);
        assert_eq!(
            layers(&h, d),
            vec![
                (false, 1.0, BlendMode::Normal, 1),
                (true, 1.0, BlendMode::Normal, 1),
                (true, 1.0, BlendMode::Screen, 1),
                (true, 1.0, BlendMode::Screen, 7),
            ]
        );

        // Stopped decks are told nothing
        h.engine.compositor_set_deck_enabled(deck(3), false);
        assert!(h.fakes.launcher.launches.lock().unwrap().iter().all(|l| l.deck != deck(3)));
    }

    #[test]
    fn test_linked_opacity_tracks_crossfader() {
        let mut h = Harness::new();
        let d = deck(0);
        h.running(d);
        h.engine.compositor_set_enabled(true);
        h.engine.compositor_set_deck_opacity(d, 0.8).unwrap();
        h.engine.crossfader_set_enabled(true);
        h.engine.crossfader_set_curve(CrossfaderCurve::Linear);
        h.engine.crossfader_set_position(0.75);

        let (_, opacity, _, _) = *layers(&h, d).last().unwrap();
        assert!((opacity - 0.2).abs() < 1e-5);

        h.engine.compositor_link_crossfader(false);
        let (_, opacity, _, _) = *layers(&h, d).last().unwrap();
        assert!((opacity - 0.8).abs() < 1e-5);

        let sent = layers(&h, d).len();
        h.engine.crossfader_set_position(0.1);
        assert_eq!(layers(&h, d).len(), sent);
    }

    #[test]
    fn test_compositor_validation_and_persistence() {
        let mut h = Harness::new();
        assert_eq!(
            h.engine.compositor_set_resolution(0, 720).unwrap_err().kind(),
            vizdeck_core::ErrorKind::InvalidArgument
        );
        h.engine.compositor_set_resolution(3840, 2160).unwrap();
        assert_eq!(h.engine.compositor_set_deck_opacity(deck(2), 1.5).unwrap(), 1.0);
        assert!(h.engine.compositor_set_deck_opacity(deck(2), f32::NAN).is_err());
        h.engine.compositor_set_deck_blend_mode(deck(2), BlendMode::Multiply);

        let saved = h.engine.current_config().compositor;
        assert_eq!(saved, h.engine.compositor_get_config());
        assert_eq!((saved.output_width, saved.output_height), (3840, 2160));
        assert_eq!(saved.decks[2].blend_mode, BlendMode::Multiply);
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let mut h = Harness::new();
        h.running(deck(0));
        h.engine.start_audio(None).unwrap();
        h.engine.midi_connect(0).unwrap();

        h.engine.shutdown();
        assert_eq!(h.state(deck(0)), DeckState::Stopped);
        assert!(!h.engine.get_multi_deck_status(Instant::now()).audio.enabled);
        assert!(!h.engine.midi_get_status().connected);
    }
}
