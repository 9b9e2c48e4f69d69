//! Renderer worker supervision
//!
//! Each deck is rendered by a separate OS process. The [`DeckManager`] owns
//! the four decks, launches workers through a [`WorkerLauncher`], and turns
//! the worker's typed status events into deck state transitions.
//!
//! ```text
//!            start()                Ready event
//! Stopped ───────────► Starting ───────────────► Running
//!    ▲                    │                         │
//!    │   exit / deadline  │ stop()                  │ stop()
//!    └──────────────── Stopping ◄───────────────────┘
//!
//! Starting / Running ── error event, bad status line, unexpected exit ──► Faulted
//! Faulted ── stop() ──► Stopped
//! ```

mod manager;
mod preset;
mod protocol;
mod state;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{Deck, DeckManager, DeckTransition, StartOptions};
pub use preset::{list_presets, validate_preset, PRESET_EXTENSIONS};
pub use protocol::{parse_event_line, RendererCommand, RendererConfig, RendererEvent, WorkerEvent};
pub use state::DeckState;
pub use worker::{
    find_renderer, DeckEvent, DeckEventSender, ProcessLauncher, Worker, WorkerLauncher,
    RENDERER_BINARY,
};
