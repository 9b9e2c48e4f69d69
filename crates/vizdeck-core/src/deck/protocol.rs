//! Renderer worker line protocol
//!
//! The engine talks to each renderer over its standard streams, one JSON
//! object per line, tagged by `"type"`:
//!
//! - stdin: [`RendererCommand`] (`load_preset`, `audio`, `stop`, ...)
//! - stdout: [`RendererEvent`] (`ready`, `closed`, `error`, `preset_loaded`)
//!
//! The renderer's startup parameters are passed as a single JSON argument
//! ([`RendererConfig`]).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compositor::BlendMode;

/// Startup parameters handed to the renderer as its first argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub preset_path: Option<PathBuf>,
    pub fullscreen: bool,
    pub deck_id: u8,
    pub monitor_index: Option<usize>,
    #[serde(default)]
    pub texture_paths: Vec<PathBuf>,
}

/// Commands written to the renderer's stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererCommand {
    LoadPreset { path: PathBuf },
    /// Interleaved stereo samples, already scaled by crossfader and master gain
    Audio { samples: Vec<f32> },
    /// Deck output level; the only place deck volume is applied
    SetVolume { volume: f32 },
    ToggleFullscreen,
    SetBeatSensitivity { value: f32 },
    SetVideoOutput {
        enabled: bool,
        device_path: Option<String>,
    },
    SetNdiOutput {
        enabled: bool,
        name: Option<String>,
    },
    SetSpoutOutput {
        enabled: bool,
        name: Option<String>,
    },
    /// How this deck's frames sit in the composited output; with
    /// `composited` false the renderer draws standalone
    SetLayer {
        composited: bool,
        opacity: f32,
        blend_mode: BlendMode,
        layer_order: i32,
    },
    SetTexturePaths { paths: Vec<PathBuf> },
    Stop,
}

impl RendererCommand {
    /// Audio packets may be dropped under back-pressure; everything else may not
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Audio { .. })
    }
}

/// Status records the renderer prints on stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererEvent {
    Ready,
    Closed,
    Error { message: String },
    PresetLoaded { path: PathBuf },
}

/// Typed worker event consumed by the deck manager
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Ready,
    PresetLoaded(PathBuf),
    Faulted(String),
    /// The worker closed its status stream (window closed, or exiting)
    OutputClosed,
    /// Process exit, with the exit code when one is available
    Exited(Option<i32>),
}

impl From<RendererEvent> for WorkerEvent {
    fn from(event: RendererEvent) -> Self {
        match event {
            RendererEvent::Ready => Self::Ready,
            RendererEvent::Closed => Self::OutputClosed,
            RendererEvent::Error { message } => Self::Faulted(message),
            RendererEvent::PresetLoaded { path } => Self::PresetLoaded(path),
        }
    }
}

/// Parse one status line from a renderer
///
/// Blank lines are skipped. Anything that is not a known status record is a
/// protocol violation and faults the deck.
pub fn parse_event_line(line: &str) -> Option<WorkerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<RendererEvent>(line) {
        Ok(event) => Some(event.into()),
        Err(e) => Some(WorkerEvent::Faulted(format!(
            "unparseable status line {:?}: {}",
            line, e
        ))),
    }
}
