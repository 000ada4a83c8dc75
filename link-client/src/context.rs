//! Per-device context handed to every plugin.
//!
//! A [`DeviceContext`] bundles what plugins need from the outside world: the
//! control transport, the presenter, the contact resolver, the settings store,
//! the live-transfer map and the session event channel. It is built once per
//! device and shared behind an `Arc`.

use crate::contacts::{ContactResolver, StaticContacts};
use crate::presenter::{LogPresenter, Presenter};
use crate::settings::{MemorySettingsStore, SettingsStore};
use crate::transfer::{TransferRegistry, TransferUpdate};
use crate::transport::Transport;
use pairlink_core::{Origin, TransferState};
use pairlink_types::{DeviceId, TransferId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Something the user shared with us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shared {
    /// A file, by its local path.
    File(PathBuf),
    /// Plain text.
    Text(String),
    /// A URL.
    Url(String),
}

/// Events observable on a device session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The tracked notification set changed.
    NotificationsChanged,
    /// Progress or state of a payload transfer.
    Transfer(TransferUpdate),
    /// A share finished and its cleanup is done.
    ShareSettled {
        /// Transfer id.
        id: TransferId,
        /// Terminal state.
        state: TransferState,
    },
    /// Content shared by the remote.
    Received(Shared),
    /// Content we shared with the remote.
    Sent(Shared),
    /// The remote dismissed a notification we forwarded.
    LocalNotificationDismissed {
        /// Local notification id.
        id: String,
    },
}

/// Everything a plugin may touch for one device.
pub struct DeviceContext {
    /// Device identifier.
    pub device: DeviceId,
    /// User-visible device name.
    pub name: String,
    /// Device type, e.g. `phone`.
    pub device_type: String,
    /// Control connection.
    pub transport: Arc<dyn Transport>,
    /// Notification presenter.
    pub presenter: Arc<dyn Presenter>,
    /// Address book.
    pub contacts: Arc<dyn ContactResolver>,
    /// Settings.
    pub settings: Arc<dyn SettingsStore>,
    /// Live transfers of this device.
    pub transfers: TransferRegistry,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device", &self.device)
            .field("name", &self.name)
            .field("device_type", &self.device_type)
            .field("transfers", &self.transfers.len())
            .finish_non_exhaustive()
    }
}

impl DeviceContext {
    /// Context with a log-only presenter, an empty address book and
    /// in-memory default settings.
    pub fn new(device: DeviceId, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: device.as_str().to_string(),
            device,
            device_type: "phone".to_string(),
            transport,
            presenter: Arc::new(LogPresenter),
            contacts: Arc::new(StaticContacts::default()),
            settings: Arc::new(MemorySettingsStore::default()),
            transfers: TransferRegistry::new(),
            events,
        }
    }

    /// Set the user-visible name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the device type.
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Use `presenter` to show notifications.
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Use `contacts` for lookups.
    pub fn with_contacts(mut self, contacts: Arc<dyn ContactResolver>) -> Self {
        self.contacts = contacts;
        self
    }

    /// Use `settings`.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    /// Origin used when formatting notifications.
    pub fn origin(&self) -> Origin<'_> {
        Origin {
            name: &self.name,
            device_type: &self.device_type,
        }
    }

    /// Publish an event. Dropped silently when nobody listens.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Sender half, for observers that outlive a borrow of the context.
    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
