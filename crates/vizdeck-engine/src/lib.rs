//! vizdeck-engine - the 4-deck visualization engine
//!
//! Composes the building blocks from `vizdeck-core` and `vizdeck-midi` into
//! one [`Orchestrator`] and runs it on a dedicated thread behind
//! [`EngineService`]. Frontends talk to it through the cloneable
//! [`EngineClient`] and observe changes on the [`EventBus`].
//!
//! ```ignore
//! let config = load_engine_config(&default_engine_config_path());
//! let backends = EngineBackends::system(&config);
//! let engine = EngineService::spawn(config, backends)?;
//! let client = engine.client();
//! client.start_deck(0, None)?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod service;
pub mod status;

#[cfg(test)]
mod testing;

pub use config::{default_engine_config_path, load_engine_config, EngineConfig, MidiSettings};
pub use error::{CommandError, CommandResult};
pub use events::{EngineEvent, EventBus};
pub use orchestrator::{EngineBackends, Orchestrator};
pub use service::{EngineClient, EngineCommand, EngineHandle, EngineService};
pub use status::{AudioStatus, DeckStatus, MultiDeckStatus, PlaylistSummary};
