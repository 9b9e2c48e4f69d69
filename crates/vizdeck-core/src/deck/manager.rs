//! Deck manager - owns the four decks and their renderer workers

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::preset::validate_preset;
use super::protocol::{RendererCommand, RendererConfig, WorkerEvent};
use super::state::DeckState;
use super::worker::{DeckEvent, DeckEventSender, Worker, WorkerLauncher};
use crate::error::{EngineError, EngineResult};
use crate::playlist::Playlist;
use crate::types::{DeckId, NUM_DECKS};

/// Default time a worker gets to exit after a stop request
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Beat sensitivity accepted by the renderer
const BEAT_SENSITIVITY_RANGE: (f32, f32) = (0.0, 5.0);

/// Parameters for starting a deck
#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    /// Preset to start with; falls back to the deck's last preset, then
    /// the playlist's current item
    pub preset: Option<PathBuf>,
    pub monitor_index: Option<usize>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fullscreen: false,
            preset: None,
            monitor_index: None,
        }
    }
}

/// State change produced by a worker event or by reaping
#[derive(Debug, Clone, PartialEq)]
pub enum DeckTransition {
    Running(DeckId),
    Stopped(DeckId),
    Faulted(DeckId, String),
    PresetLoaded(DeckId, PathBuf),
}

/// One visualization deck
pub struct Deck {
    pub id: DeckId,
    pub state: DeckState,
    pub preset: Option<PathBuf>,
    pub volume: f32,
    pub beat_sensitivity: f32,
    pub playlist: Playlist,
    worker: Option<Box<dyn Worker>>,
    generation: u64,
    started_at: Option<Instant>,
    stop_deadline: Option<Instant>,
    crash_count: u32,
}

impl Deck {
    fn new(id: DeckId) -> Self {
        Self {
            id,
            state: DeckState::Stopped,
            preset: None,
            volume: 1.0,
            beat_sensitivity: 1.0,
            playlist: Playlist::default(),
            worker: None,
            generation: 0,
            started_at: None,
            stop_deadline: None,
            crash_count: 0,
        }
    }

    /// Seconds since the current worker was launched
    pub fn uptime(&self, now: Instant) -> Duration {
        self.started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// Unexpected exits and faults since the engine started
    pub fn crash_count(&self) -> u32 {
        self.crash_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn release_worker(&mut self) {
        self.worker = None;
        self.started_at = None;
        self.stop_deadline = None;
    }
}

/// Owns every deck and supervises their renderer processes
pub struct DeckManager {
    decks: [Deck; NUM_DECKS],
    launcher: Box<dyn WorkerLauncher>,
    events_tx: DeckEventSender,
    stop_grace: Duration,
    next_generation: u64,
    texture_paths: Vec<PathBuf>,
}

impl DeckManager {
    pub fn new(launcher: Box<dyn WorkerLauncher>, events_tx: DeckEventSender) -> Self {
        Self {
            decks: std::array::from_fn(|i| Deck::new(DeckId::from_array_index(i))),
            launcher,
            events_tx,
            stop_grace: DEFAULT_STOP_GRACE,
            next_generation: 1,
            texture_paths: Vec::new(),
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut Deck {
        &mut self.decks[id.index()]
    }

    pub fn decks(&self) -> impl Iterator<Item = &Deck> {
        self.decks.iter()
    }

    pub fn playlist_mut(&mut self, id: DeckId) -> &mut Playlist {
        &mut self.decks[id.index()].playlist
    }

    pub fn is_running(&self, id: DeckId) -> bool {
        self.deck(id).state.is_running()
    }

    pub fn running_ids(&self) -> Vec<DeckId> {
        self.decks
            .iter()
            .filter(|deck| deck.state.is_running())
            .map(|deck| deck.id)
            .collect()
    }

    pub fn any_running(&self) -> bool {
        self.decks.iter().any(|deck| deck.state.is_running())
    }

    /// Whether any deck holds a worker that must be polled for exit
    pub fn has_live_workers(&self) -> bool {
        self.decks.iter().any(|deck| deck.worker.is_some())
    }

    /// Earliest pending stop deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.decks.iter().filter_map(|deck| deck.stop_deadline).min()
    }

    pub fn texture_paths(&self) -> &[PathBuf] {
        &self.texture_paths
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Launch the renderer for a deck
    ///
    /// Returns as soon as the process is spawned; the deck stays `Starting`
    /// until the worker reports ready.
    pub fn start(&mut self, id: DeckId, options: StartOptions) -> EngineResult<()> {
        let texture_paths = self.texture_paths.clone();
        let deck = &mut self.decks[id.index()];
        if deck.state != DeckState::Stopped {
            return Err(EngineError::AlreadyRunning(id));
        }

        let preset = match options.preset {
            Some(path) => Some(validate_preset(&path)?),
            None => deck
                .preset
                .clone()
                .or_else(|| deck.playlist.current().map(|item| item.path.clone())),
        };

        let config = RendererConfig {
            width: options.width,
            height: options.height,
            preset_path: preset.clone(),
            fullscreen: options.fullscreen,
            deck_id: id.into(),
            monitor_index: options.monitor_index,
            texture_paths,
        };

        let generation = self.next_generation;
        self.next_generation += 1;

        let worker = self
            .launcher
            .launch(id, generation, &config, self.events_tx.clone())?;

        deck.worker = Some(worker);
        deck.generation = generation;
        deck.started_at = Some(Instant::now());
        deck.stop_deadline = None;
        deck.preset = preset;
        deck.state = DeckState::Starting;

        log::info!(
            "Deck {}: starting ({}x{}, fullscreen={}, preset={:?})",
            id,
            options.width,
            options.height,
            options.fullscreen,
            deck.preset
        );
        Ok(())
    }

    /// Request a graceful stop
    ///
    /// The deck moves to `Stopping`; [`DeckManager::reap`] completes the stop
    /// when the worker exits or kills it once the grace period runs out.
    /// Stopping a faulted deck clears the fault.
    pub fn stop(&mut self, id: DeckId, now: Instant) -> Option<DeckTransition> {
        let grace = self.stop_grace;
        let deck = &mut self.decks[id.index()];
        match deck.state {
            DeckState::Stopped | DeckState::Stopping => None,
            DeckState::Faulted(_) => {
                deck.release_worker();
                deck.state = DeckState::Stopped;
                log::info!("Deck {}: fault cleared", id);
                Some(DeckTransition::Stopped(id))
            }
            DeckState::Starting | DeckState::Running => {
                let requested = deck
                    .worker
                    .as_mut()
                    .map(|worker| worker.send(&RendererCommand::Stop));
                deck.stop_deadline = match requested {
                    Some(Ok(())) => Some(now + grace),
                    _ => Some(now),
                };
                deck.state = DeckState::Stopping;
                log::info!("Deck {}: stopping", id);
                None
            }
        }
    }

    /// Poll workers for exit and enforce stop deadlines
    pub fn reap(&mut self, now: Instant) -> Vec<DeckTransition> {
        let mut transitions = Vec::new();
        for index in 0..NUM_DECKS {
            let deck = &mut self.decks[index];
            let Some(worker) = deck.worker.as_mut() else {
                continue;
            };
            let (id, generation) = (deck.id, deck.generation);

            match worker.try_wait() {
                Ok(Some(code)) => {
                    let event = DeckEvent {
                        deck: id,
                        generation,
                        event: WorkerEvent::Exited(code),
                    };
                    transitions.extend(self.handle_event(event));
                }
                Ok(None) => {
                    let overdue = deck.state == DeckState::Stopping
                        && deck.stop_deadline.is_some_and(|deadline| now >= deadline);
                    if overdue {
                        log::warn!("Deck {}: renderer ignored stop request, killing", id);
                        if let Err(e) = worker.kill() {
                            log::error!("Deck {}: failed to kill renderer: {}", id, e);
                        }
                        deck.release_worker();
                        deck.state = DeckState::Stopped;
                        transitions.push(DeckTransition::Stopped(id));
                    }
                }
                Err(e) => {
                    transitions.push(self.fault(id, format!("failed to poll renderer: {}", e)));
                }
            }
        }
        transitions
    }

    /// Apply a worker event
    ///
    /// Events from an earlier launch of the same deck are ignored.
    pub fn handle_event(&mut self, event: DeckEvent) -> Option<DeckTransition> {
        let DeckEvent {
            deck: id,
            generation,
            event,
        } = event;
        let deck = &mut self.decks[id.index()];
        if deck.worker.is_none() || deck.generation != generation {
            log::debug!("Deck {}: ignoring stale event {:?}", id, event);
            return None;
        }

        match event {
            WorkerEvent::Ready => {
                if deck.state == DeckState::Starting {
                    deck.state = DeckState::Running;
                    log::info!("Deck {}: running", id);
                    Some(DeckTransition::Running(id))
                } else {
                    None
                }
            }
            WorkerEvent::PresetLoaded(path) => {
                deck.preset = Some(path.clone());
                Some(DeckTransition::PresetLoaded(id, path))
            }
            WorkerEvent::Faulted(reason) => {
                if deck.state == DeckState::Stopping {
                    log::debug!("Deck {}: error while stopping: {}", id, reason);
                    None
                } else {
                    Some(self.fault(id, reason))
                }
            }
            // Exit is picked up by the next reap
            WorkerEvent::OutputClosed => None,
            WorkerEvent::Exited(code) => {
                if deck.state == DeckState::Stopping {
                    deck.release_worker();
                    deck.state = DeckState::Stopped;
                    log::info!("Deck {}: stopped (exit code {:?})", id, code);
                    Some(DeckTransition::Stopped(id))
                } else {
                    let reason = match code {
                        Some(code) => format!("renderer exited unexpectedly with code {}", code),
                        None => "renderer terminated by signal".to_string(),
                    };
                    Some(self.fault(id, reason))
                }
            }
        }
    }

    fn fault(&mut self, id: DeckId, reason: String) -> DeckTransition {
        let deck = &mut self.decks[id.index()];
        if let Some(mut worker) = deck.worker.take() {
            if let Err(e) = worker.kill() {
                log::debug!("Deck {}: kill after fault failed: {}", id, e);
            }
        }
        deck.release_worker();
        deck.crash_count += 1;
        deck.state = DeckState::Faulted(reason.clone());
        log::error!("Deck {}: faulted: {}", id, reason);
        DeckTransition::Faulted(id, reason)
    }

    /// Kill every worker immediately
    pub fn shutdown(&mut self) {
        for deck in self.decks.iter_mut() {
            if let Some(mut worker) = deck.worker.take() {
                let _ = worker.send(&RendererCommand::Stop);
                if let Err(e) = worker.kill() {
                    log::warn!("Deck {}: kill on shutdown failed: {}", deck.id, e);
                }
            }
            deck.release_worker();
            deck.state = DeckState::Stopped;
        }
    }

    // =========================================================================
    // Deck controls
    // =========================================================================

    /// Send a command to a running deck
    ///
    /// Returns `Ok(false)` without sending when the deck is not running.
    pub fn forward(&mut self, id: DeckId, command: &RendererCommand) -> EngineResult<bool> {
        let deck = &mut self.decks[id.index()];
        if !deck.state.is_running() {
            return Ok(false);
        }
        match deck.worker.as_mut() {
            Some(worker) => worker
                .send(command)
                .map(|_| true)
                .map_err(|e| EngineError::WorkerIo {
                    deck: id,
                    reason: e.to_string(),
                }),
            None => Ok(false),
        }
    }

    /// Set deck volume, clamped to 0.0-1.0
    ///
    /// The renderer applies it; pumped audio is not scaled by it. A stopped
    /// deck keeps the value for reporting.
    pub fn set_volume(&mut self, id: DeckId, volume: f32) -> EngineResult<f32> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.forward(id, &RendererCommand::SetVolume { volume })?;
        self.decks[id.index()].volume = volume;
        Ok(volume)
    }

    /// Set beat detection sensitivity, clamped to 0.0-5.0
    pub fn set_beat_sensitivity(&mut self, id: DeckId, value: f32) -> EngineResult<f32> {
        let (min, max) = BEAT_SENSITIVITY_RANGE;
        let value = if value.is_nan() { 1.0 } else { value.clamp(min, max) };
        self.forward(id, &RendererCommand::SetBeatSensitivity { value })?;
        self.decks[id.index()].beat_sensitivity = value;
        Ok(value)
    }

    pub fn toggle_fullscreen(&mut self, id: DeckId) -> EngineResult<()> {
        if !self.forward(id, &RendererCommand::ToggleFullscreen)? {
            return Err(EngineError::NotRunning(id));
        }
        Ok(())
    }

    /// Load a preset on a deck
    ///
    /// A running deck receives the preset immediately; otherwise it becomes
    /// the preset the deck starts with.
    pub fn load_preset(&mut self, id: DeckId, path: &Path) -> EngineResult<()> {
        let path = validate_preset(path)?;
        let sent = self.forward(id, &RendererCommand::LoadPreset { path: path.clone() })?;
        log::info!(
            "Deck {}: preset {:?} ({})",
            id,
            path,
            if sent { "loading" } else { "queued for start" }
        );
        self.decks[id.index()].preset = Some(path);
        Ok(())
    }

    /// Set the texture search paths for all decks
    pub fn set_texture_paths(&mut self, paths: Vec<PathBuf>) -> EngineResult<()> {
        self.texture_paths = paths;
        let command = RendererCommand::SetTexturePaths {
            paths: self.texture_paths.clone(),
        };
        for id in self.running_ids() {
            self.forward(id, &command)?;
        }
        Ok(())
    }
}
