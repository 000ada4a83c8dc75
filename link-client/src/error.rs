//! Plugin and session errors.

use crate::channel::ChannelError;
use crate::settings::SettingsError;
use crate::transport::TransportError;
use pairlink_types::PacketType;
use thiserror::Error;

/// Errors raised while handling or emitting packets.
///
/// None of these end the device session; each is scoped to one packet or one
/// transfer.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Payload channel error.
    #[error("payload channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Settings could not be saved.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Local file error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A plugin tried to emit a type it did not declare.
    #[error("plugin {plugin} does not declare outgoing {packet_type}")]
    UndeclaredPacket {
        /// Plugin name.
        plugin: &'static str,
        /// Type it tried to send.
        packet_type: String,
    },

    /// Two plugins claimed the same incoming type.
    #[error("{packet_type} is already handled by {existing}")]
    DuplicateRoute {
        /// Contested type.
        packet_type: PacketType,
        /// Plugin that registered it first.
        existing: &'static str,
    },

    /// The packet needs a payload but carries none.
    #[error("{0} packet has no payload")]
    MissingPayload(PacketType),

    /// The packet's body does not fit the plugin it was routed to.
    #[error("unexpected {0} packet")]
    UnexpectedBody(String),

    /// The transport cannot tell where to open a payload channel.
    #[error("peer address unknown")]
    NoPeerAddress,

    /// The plugin's worker is gone.
    #[error("plugin stopped")]
    Stopped,
}
