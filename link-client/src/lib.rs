//! # pairlink-client
//!
//! Device session library for pairlink.
//!
//! This crate performs the I/O around the pure logic in `pairlink-core`:
//!
//! ## Features
//!
//! - **Payload Transfers**: single-use TCP channels driven chunk by chunk,
//!   with checksums and cooperative cancellation
//! - **Plugins**: notification sync and sharing, routed by packet type
//! - **Transport Abstraction**: pluggable control transport (LAN, mock)
//! - **Collaborators**: presenter, contact resolver and settings store traits
//!
//! ## Example
//!
//! ```ignore
//! use pairlink_client::{DeviceContext, DeviceSession, LanTransport};
//!
//! let transport = Arc::new(LanTransport::connect(addr).await?);
//! let session = DeviceSession::new(DeviceContext::new(device_id, transport))?;
//!
//! session.request_remote_state().await?;
//! let id = session.share_file("/home/me/book.pdf").await?;
//! session.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod contacts;
pub mod context;
pub mod device;
pub mod error;
pub mod payload;
pub mod plugin;
pub mod plugins;
pub mod presenter;
pub mod settings;
pub mod transfer;
pub mod transport;

pub use channel::{ChannelError, ChannelRole, TransferChannel};
pub use contacts::{ContactResolver, StaticContacts};
pub use context::{unix_now, DeviceContext, SessionEvent, Shared};
pub use device::DeviceSession;
pub use error::PluginError;
pub use plugin::{Dispatch, Outbox, Plugin, PluginDispatcher, Settlement};
pub use plugins::{LocalNotification, NotificationPlugin, SharePlugin};
pub use presenter::{LogPresenter, MockPresenter, Presenter};
pub use settings::{
    FileSettingsStore, MemorySettingsStore, PortRange, Settings, SettingsError, SettingsStore,
};
pub use transfer::{Transfer, TransferRegistry, TransferUpdate, DEFAULT_CHUNK_SIZE};
pub use transport::{LanTransport, MockTransport, Transport, TransportError, MAX_PACKET_SIZE};
