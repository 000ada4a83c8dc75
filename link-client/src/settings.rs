//! Per-device settings.
//!
//! Settings are stored as TOML (default: `settings.toml` in the data
//! directory). Every section and field has a default, so an empty file is a
//! valid configuration.

use pairlink_core::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Root settings for one paired device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Notification sync.
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Receiving shared files.
    #[serde(default)]
    pub share: ShareSettings,
    /// Payload transfers.
    #[serde(default)]
    pub transfer: TransferSettings,
    /// Contact avatars.
    #[serde(default)]
    pub contacts: ContactSettings,
}

/// Notification sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Show notifications posted on the remote (default: true).
    #[serde(default = "default_true")]
    pub receive_notifications: bool,
    /// Forward local notifications to the remote (default: true).
    #[serde(default = "default_true")]
    pub send_notifications: bool,
    /// Do-not-disturb until this unix timestamp (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_not_disturb_until: Option<i64>,
    /// Local applications seen so far and whether they are forwarded.
    #[serde(default)]
    pub applications: BTreeMap<String, ApplicationSettings>,
}

/// Forwarding switch for one local application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Themed icon name the application posted with.
    #[serde(default)]
    pub icon_name: String,
    /// Forward this application's notifications (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Where received files go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareSettings {
    /// Download directory (default: `Downloads`).
    #[serde(default = "default_download_directory")]
    pub download_directory: PathBuf,
    /// Put files in a subdirectory named after the device (default: false).
    #[serde(default)]
    pub download_subdirectory: bool,
}

/// Payload transfer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Digest used for `payloadHash` (default: md5).
    #[serde(default)]
    pub checksum: ChecksumAlgorithm,
    /// Bytes per chunk (default: 64 KiB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Ports tried for upload channels (default: 1739-1764).
    #[serde(default)]
    pub payload_ports: PortRange,
    /// Seconds a channel may stay stalled before the transfer fails (default: 30).
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
}

/// Inclusive TCP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First port.
    pub start: u16,
    /// Last port.
    pub end: u16,
}

/// Contact avatar cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSettings {
    /// Directory avatars are cached in (default: `avatars`).
    #[serde(default = "default_avatar_cache_directory")]
    pub avatar_cache_directory: PathBuf,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_download_directory() -> PathBuf {
    PathBuf::from("Downloads")
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_transfer_timeout_secs() -> u64 {
    30
}

fn default_avatar_cache_directory() -> PathBuf {
    PathBuf::from("avatars")
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            receive_notifications: default_true(),
            send_notifications: default_true(),
            do_not_disturb_until: None,
            applications: BTreeMap::new(),
        }
    }
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            download_subdirectory: false,
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            checksum: ChecksumAlgorithm::default(),
            chunk_size: default_chunk_size(),
            payload_ports: PortRange::default(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 1739,
            end: 1764,
        }
    }
}

impl Default for ContactSettings {
    fn default() -> Self {
        Self {
            avatar_cache_directory: default_avatar_cache_directory(),
        }
    }
}

impl PortRange {
    /// Ports in the range, in order.
    pub fn ports(&self) -> std::ops::RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl TransferSettings {
    /// Stall timeout as a duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.transfer_timeout_secs)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| SettingsError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write settings to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| SettingsError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to read settings file.
    #[error("failed to read settings file {path}: {source}")]
    ReadError {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse settings file.
    #[error("failed to parse settings file {path}: {source}")]
    ParseError {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Failed to write settings file.
    #[error("failed to write settings file {path}: {source}")]
    WriteError {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Settings could not be encoded.
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Where settings live between restarts.
///
/// Components read a snapshot when they need one and write through
/// [`SettingsStore::update`], so changes made at runtime (a new application,
/// a do-not-disturb window) are persisted.
pub trait SettingsStore: Send + Sync {
    /// Current settings.
    fn snapshot(&self) -> Settings;

    /// Apply `change` and persist the result.
    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<(), SettingsError>;
}

/// Settings kept in memory only.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
}

impl MemorySettingsStore {
    /// Store holding `settings`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn snapshot(&self) -> Settings {
        read(&self.settings).clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<(), SettingsError> {
        change(&mut write(&self.settings));
        Ok(())
    }
}

/// Settings persisted to a TOML file on every update.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl FileSettingsStore {
    /// Open the store at `path`. A missing file yields default settings and is
    /// created on the first update.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = if path.exists() {
            Settings::from_file(&path)?
        } else {
            Settings::default()
        };
        Ok(Self {
            path,
            settings: RwLock::new(settings),
        })
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn snapshot(&self) -> Settings {
        read(&self.settings).clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<(), SettingsError> {
        let mut settings = write(&self.settings);
        change(&mut settings);
        settings.save(&self.path)
    }
}

fn read(lock: &RwLock<Settings>) -> RwLockReadGuard<'_, Settings> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &RwLock<Settings>) -> RwLockWriteGuard<'_, Settings> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
