//! Settings file handling for pairlink.

use anyhow::{Context, Result};
use pairlink_client::{FileSettingsStore, Settings, SettingsStore};
use std::path::{Path, PathBuf};

/// Name of the settings file inside the data directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Path of the settings file for `data_dir`.
pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// Open the settings store in `data_dir`.
///
/// Relative directories in the settings are anchored at `data_dir`. A fresh
/// data directory gets a settings file written with those anchored paths.
pub fn open_settings(data_dir: &Path) -> Result<FileSettingsStore> {
    let path = settings_path(data_dir);
    let fresh = !path.exists();
    let store = FileSettingsStore::open(&path)
        .with_context(|| format!("Failed to open settings at {}", path.display()))?;

    let current = store.snapshot();
    if fresh || needs_anchoring(&current) {
        store
            .update(&mut |settings| anchor(settings, data_dir))
            .context("Failed to save settings")?;
    }
    Ok(store)
}

fn needs_anchoring(settings: &Settings) -> bool {
    settings.share.download_directory.is_relative()
        || settings.contacts.avatar_cache_directory.is_relative()
}

fn anchor(settings: &mut Settings, data_dir: &Path) {
    if settings.share.download_directory.is_relative() {
        settings.share.download_directory = data_dir.join(&settings.share.download_directory);
    }
    if settings.contacts.avatar_cache_directory.is_relative() {
        settings.contacts.avatar_cache_directory =
            data_dir.join(&settings.contacts.avatar_cache_directory);
    }
}
