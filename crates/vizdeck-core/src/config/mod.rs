//! Shared configuration utilities
//!
//! Provides YAML config loading/saving and the standard config locations
//! used by the engine and the MIDI preset store.
//!
//! # Usage
//!
//! ```ignore
//! use vizdeck_core::config::{load_config, save_config, default_config_path};
//!
//! let path = default_config_path("engine.yaml");
//! let config: EngineConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, midi_preset_dir};
