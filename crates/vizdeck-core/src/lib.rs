//! vizdeck-core - Deck orchestration building blocks
//!
//! This crate provides the pieces the engine composes into a 4-deck
//! audio-reactive visualization mixer:
//! - Renderer worker supervision and the line-based worker protocol
//! - Audio capture with a self-healing pump into running decks
//! - Crossfader gain math
//! - Compositor layer settings (opacity, blend mode, stacking)
//! - Per-deck playlists with shuffle and auto-cycle timers
//! - Video output routing (v4l2loopback, NDI, Spout)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────┐  stdin (JSON lines)  ┌──────────┐
//! │ Orchestrator │ ──────────► │ DeckManager  │ ───────────────────► │ renderer │
//! │ (engine crate)│ ◄────────── │  4 x Deck    │ ◄─────────────────── │ process  │
//! └──────┬───────┘ transitions └──────────────┘  stdout (JSON lines) └──────────┘
//!        │
//!        │ tick (display refresh cadence)
//!        ▼
//! ┌──────────────┐  rtrb ring   ┌──────────────┐
//! │  AudioPump   │ ◄─────────── │ capture thread│ (cpal stream or parec)
//! └──────────────┘              └──────────────┘
//! ```
//!
//! All state in this crate is owned by a single control thread; the only
//! cross-thread traffic is through channels and lock-free ring buffers.

pub mod audio;
pub mod compositor;
pub mod config;
pub mod crossfader;
pub mod deck;
pub mod error;
pub mod playlist;
pub mod types;
pub mod video;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use types::{DeckId, StereoLevels, NUM_DECKS};
