//! Packet transport abstraction for pairlink.
//!
//! The transport carries control packets for one paired device. It never
//! carries payload bytes; those travel over a separate
//! [`TransferChannel`](crate::TransferChannel).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `send()` transmits one packet
//! - `recv()` receives the next packet, in order
//! - `peer_addr()` tells payload channels where to connect
//! - `close()` gracefully terminates
//!
//! # Example
//!
//! ```ignore
//! let transport = LanTransport::connect("192.168.1.20:1716".parse()?).await?;
//! transport.send(&Packet::new(NotificationRequest::resend_all())).await?;
//! let packet = transport.recv().await?;
//! ```

mod lan;
mod mock;

pub use lan::{LanTransport, MAX_PACKET_SIZE};
pub use mock::MockTransport;

use async_trait::async_trait;
use pairlink_types::{Packet, PacketError};
use std::net::SocketAddr;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A packet arrived but could not be decoded. The connection is still
    /// usable; only this packet is lost.
    #[error("malformed packet: {0}")]
    Malformed(#[from] PacketError),

    /// A packet exceeded the size limit.
    #[error("packet too large: {size} bytes (max {max})")]
    TooLarge {
        /// Bytes read before giving up.
        size: usize,
        /// Maximum accepted.
        max: usize,
    },
}

impl TransportError {
    /// True when the connection can keep being used after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Malformed(_))
    }
}

/// Transport for one device's control packets.
///
/// Delivery is reliable and in order for the lifetime of the connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one packet.
    async fn send(&self, packet: &Packet) -> Result<(), TransportError>;

    /// Receive the next packet.
    ///
    /// Blocks until a packet is available or the connection closes.
    async fn recv(&self) -> Result<Packet, TransportError>;

    /// Address of the remote end, used to open payload channels.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
