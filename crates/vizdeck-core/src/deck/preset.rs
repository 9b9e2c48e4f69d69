//! Preset file validation and discovery

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};

/// File extensions accepted as visualization presets
pub const PRESET_EXTENSIONS: [&str; 2] = ["milk", "prjm"];

fn has_preset_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PRESET_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

/// Check that `path` is an existing regular file with a preset extension
pub fn validate_preset(path: &Path) -> EngineResult<PathBuf> {
    let is_file = std::fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false);

    if is_file && has_preset_extension(path) {
        Ok(path.to_path_buf())
    } else {
        Err(EngineError::InvalidPreset(path.to_path_buf()))
    }
}

/// Recursively list preset files under `dir`, sorted by path
///
/// Unreadable entries are skipped.
pub fn list_presets(dir: &Path) -> Vec<PathBuf> {
    let mut presets: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("Presets: skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_preset_extension(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    presets.sort();
    presets
}
