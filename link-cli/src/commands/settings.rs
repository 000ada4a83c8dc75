//! Inspect and change local settings.

use anyhow::{Context, Result};
use pairlink_client::{unix_now, SettingsStore};
use std::path::Path;

use crate::config::{open_settings, settings_path};

/// A change to apply to the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Do not disturb for this many minutes, or switch it off with `None`.
    DoNotDisturb(Option<u64>),
    /// Show notifications posted on the peer.
    Receive(bool),
    /// Forward local notifications to the peer.
    Send(bool),
    /// Forward notifications of one local application.
    Application {
        /// Application name.
        name: String,
        /// Forwarding switch.
        enabled: bool,
    },
}

/// Print the current settings.
pub async fn show(data_dir: &Path) -> Result<()> {
    let store = open_settings(data_dir)?;
    let settings = store.snapshot();

    println!("=== pairlink settings ===");
    println!();
    println!("File: {}", settings_path(data_dir).display());
    println!();
    println!("Notifications:");
    println!("  Receive: {}", on_off(settings.notifications.receive_notifications));
    println!("  Send:    {}", on_off(settings.notifications.send_notifications));
    match settings.notifications.do_not_disturb_until {
        Some(until) if until > unix_now() => {
            println!("  Do not disturb: {} more minute(s)", (until - unix_now() + 59) / 60)
        }
        _ => println!("  Do not disturb: off"),
    }
    if !settings.notifications.applications.is_empty() {
        println!("  Applications:");
        for (name, app) in &settings.notifications.applications {
            println!("    {} [{}]", name, on_off(app.enabled));
        }
    }
    println!();
    println!("Share:");
    println!("  Downloads: {}", settings.share.download_directory.display());
    println!(
        "  Per-device subdirectory: {}",
        on_off(settings.share.download_subdirectory)
    );
    println!();
    println!("Transfers:");
    println!("  Checksum:   {:?}", settings.transfer.checksum);
    println!("  Chunk size: {} bytes", settings.transfer.chunk_size);
    println!(
        "  Ports:      {}-{}",
        settings.transfer.payload_ports.start, settings.transfer.payload_ports.end
    );
    println!("  Timeout:    {}s", settings.transfer.transfer_timeout_secs);

    Ok(())
}

/// Apply `change` and persist it.
pub async fn set(data_dir: &Path, change: Change) -> Result<()> {
    let store = open_settings(data_dir)?;
    let now = unix_now();

    store
        .update(&mut |settings| match &change {
            Change::DoNotDisturb(minutes) => {
                settings.notifications.do_not_disturb_until =
                    minutes.map(|m| now + (m as i64) * 60);
            }
            Change::Receive(on) => settings.notifications.receive_notifications = *on,
            Change::Send(on) => settings.notifications.send_notifications = *on,
            Change::Application { name, enabled } => {
                settings
                    .notifications
                    .applications
                    .entry(name.clone())
                    .or_insert_with(|| pairlink_client::settings::ApplicationSettings {
                        icon_name: String::new(),
                        enabled: true,
                    })
                    .enabled = *enabled;
            }
        })
        .context("Failed to save settings")?;

    println!("Settings updated.");
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn do_not_disturb_is_stored_as_deadline() {
        let dir = tempdir().unwrap();

        set(dir.path(), Change::DoNotDisturb(Some(30))).await.unwrap();

        let until = open_settings(dir.path())
            .unwrap()
            .snapshot()
            .notifications
            .do_not_disturb_until
            .unwrap();
        let remaining = until - unix_now();
        assert!(remaining > 29 * 60 && remaining <= 30 * 60);
    }

    #[tokio::test]
    async fn do_not_disturb_can_be_switched_off() {
        let dir = tempdir().unwrap();
        set(dir.path(), Change::DoNotDisturb(Some(5))).await.unwrap();

        set(dir.path(), Change::DoNotDisturb(None)).await.unwrap();

        let settings = open_settings(dir.path()).unwrap().snapshot();
        assert_eq!(settings.notifications.do_not_disturb_until, None);
    }

    #[tokio::test]
    async fn application_switch_creates_entry() {
        let dir = tempdir().unwrap();

        set(
            dir.path(),
            Change::Application {
                name: "Slack".to_string(),
                enabled: false,
            },
        )
        .await
        .unwrap();

        let settings = open_settings(dir.path()).unwrap().snapshot();
        assert!(!settings.notifications.applications["Slack"].enabled);
    }

    #[tokio::test]
    async fn toggles_are_persisted() {
        let dir = tempdir().unwrap();

        set(dir.path(), Change::Receive(false)).await.unwrap();
        set(dir.path(), Change::Send(false)).await.unwrap();

        let settings = open_settings(dir.path()).unwrap().snapshot();
        assert!(!settings.notifications.receive_notifications);
        assert!(!settings.notifications.send_notifications);
    }

    #[tokio::test]
    async fn show_works_on_fresh_data_dir() {
        let dir = tempdir().unwrap();

        show(dir.path()).await.unwrap();
    }
}
