//! Audio pump - moves captured audio into running decks
//!
//! One [`AudioPump::pump`] call per rendered frame: drain the capture ring,
//! update the meters, scale the block per deck and queue it to every
//! `Running` renderer. Failures never stop the pump; they are counted and
//! a single warning is raised when a streak reaches
//! [`FAILURE_WARN_THRESHOLD`].

use super::capture::CaptureBackend;
use super::config::AudioConfig;
use super::error::AudioResult;
use crate::deck::{DeckManager, RendererCommand};
use crate::types::{StereoLevels, NUM_DECKS};

/// Consecutive failures before the user is warned
pub const FAILURE_WARN_THRESHOLD: u32 = 5;

/// Consecutive-failure tracking for the pump
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpHealth {
    consecutive_failures: u32,
    warned: bool,
}

impl PumpHealth {
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.warned = false;
    }

    /// Count a failure; true exactly once per streak, when it reaches the threshold
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.warned && self.consecutive_failures >= FAILURE_WARN_THRESHOLD {
            self.warned = true;
            true
        } else {
            false
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Result of one pump tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    /// Audio packets queued to renderers
    pub sent: usize,
    /// Failure reason when this tick failed
    pub failure: Option<String>,
    /// Set on the tick that completes a failure streak
    pub warning: Option<String>,
}

/// Owns the capture backend and feeds decks
pub struct AudioPump {
    capture: Box<dyn CaptureBackend>,
    config: AudioConfig,
    enabled: bool,
    health: PumpHealth,
    levels: StereoLevels,
    scratch: Vec<f32>,
}

impl AudioPump {
    pub fn new(capture: Box<dyn CaptureBackend>, config: AudioConfig) -> Self {
        Self {
            capture,
            config,
            enabled: false,
            health: PumpHealth::default(),
            levels: StereoLevels::default(),
            scratch: Vec::with_capacity(8192),
        }
    }

    /// Start capture, optionally switching device
    ///
    /// Starting while already started restarts on the (new) device.
    pub fn start(&mut self, device: Option<String>) -> AudioResult<()> {
        if device.is_some() {
            self.config.device = device;
        }
        self.capture.start(&self.config)?;
        self.enabled = true;
        self.health = PumpHealth::default();
        log::info!("Audio: capture enabled");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.capture.stop();
        self.enabled = false;
        self.levels = StereoLevels::default();
        log::info!("Audio: capture disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Latest stereo peaks; stale values are kept while no audio arrives
    pub fn levels(&self) -> StereoLevels {
        self.levels
    }

    pub fn health(&self) -> PumpHealth {
        self.health
    }

    /// Run one pump tick
    ///
    /// Each running deck receives the captured block scaled by
    /// `gains[deck] * master_volume`. Deck volume is left to the renderer.
    pub fn pump(
        &mut self,
        decks: &mut DeckManager,
        gains: &[f32; NUM_DECKS],
        master_volume: f32,
    ) -> PumpReport {
        if !self.enabled {
            return PumpReport::default();
        }

        self.scratch.clear();
        let frames = match self.capture.read_frames(&mut self.scratch) {
            Ok(frames) => frames,
            Err(e) => return self.fail(e.to_string(), 0),
        };
        if frames == 0 {
            self.health.record_success();
            return PumpReport::default();
        }

        self.levels = peak_levels(&self.scratch);

        let mut sent = 0;
        let mut errors = Vec::new();
        for id in decks.running_ids() {
            let scale = gains[id.index()] * master_volume;
            let samples = if scale == 1.0 {
                self.scratch.clone()
            } else {
                self.scratch.iter().map(|s| s * scale).collect()
            };
            match decks.forward(id, &RendererCommand::Audio { samples }) {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            self.health.record_success();
            PumpReport {
                sent,
                ..PumpReport::default()
            }
        } else {
            self.fail(errors.join("; "), sent)
        }
    }

    fn fail(&mut self, reason: String, sent: usize) -> PumpReport {
        log::debug!("Audio: pump failed: {}", reason);
        let warn = self.health.record_failure();

        // Self-heal a capture that died underneath us
        if !self.capture.is_running() {
            match self.capture.start(&self.config) {
                Ok(()) => log::info!("Audio: capture restarted"),
                Err(e) => log::debug!("Audio: capture restart failed: {}", e),
            }
        }

        let warning = warn.then(|| {
            let message = format!(
                "Audio capture failed {} times in a row: {}",
                FAILURE_WARN_THRESHOLD, reason
            );
            log::warn!("Audio: {}", message);
            message
        });

        PumpReport {
            sent,
            failure: Some(reason),
            warning,
        }
    }
}

/// Per-channel absolute peak of an interleaved stereo block, clamped to 1.0
pub fn peak_levels(samples: &[f32]) -> StereoLevels {
    let (left, right) = samples
        .chunks_exact(2)
        .fold((0.0f32, 0.0f32), |(l, r), frame| {
            (l.max(frame[0].abs()), r.max(frame[1].abs()))
        });
    StereoLevels::new(left.min(1.0), right.min(1.0))
}
