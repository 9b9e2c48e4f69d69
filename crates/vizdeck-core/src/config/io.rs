//! Generic configuration I/O
//!
//! Works with any serde configuration type. Missing or unreadable files fall
//! back to defaults so a broken config never keeps the engine from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read a YAML config, or `T::default()` when the file is absent or bad
pub fn load_config<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.is_file() {
        log::info!("Config: no file at {}, using defaults", path.display());
        return T::default();
    }

    read_yaml(path).unwrap_or_else(|e| {
        log::warn!("Config: {:#}; falling back to defaults", e);
        T::default()
    })
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let value = serde_yaml::from_str(&text)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    log::info!("Config: loaded {}", path.display());
    Ok(value)
}

/// Write a config as YAML, creating the directory on first save
///
/// The file is written next to its destination and renamed into place, so
/// a crash mid-write leaves the previous config intact.
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let yaml = serde_yaml::to_string(config).context("cannot encode config as YAML")?;
    let staging = path.with_extension("yaml.tmp");
    std::fs::write(&staging, yaml)
        .with_context(|| format!("cannot write {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("cannot replace {}", path.display()))?;

    log::info!("Config: saved {}", path.display());
    Ok(())
}
