//! Out-of-band payload channels.
//!
//! A [`TransferChannel`] is one TCP connection used to move exactly one
//! payload, separate from the control connection. The uploading side listens
//! on a port from the configured range and announces it in the packet's
//! `payloadTransferInfo`; the downloading side dials that port.
//!
//! Channels are single use: open, hand the stream to one transfer, close.
//! They never retry; that decision belongs to the caller.

use crate::settings::PortRange;
use pairlink_types::DeviceId;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, trace};

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No port in the range could be bound.
    #[error("no free payload port in {start}-{end}")]
    NoFreePort {
        /// First port tried.
        start: u16,
        /// Last port tried.
        end: u16,
    },

    /// Waiting for the remote to dial in failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Dialling the remote failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address dialled.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The operation does not fit the channel's current state.
    #[error("channel is {0}")]
    InvalidState(&'static str),
}

/// Which end of the payload connection this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// We listen and send the payload.
    Upload,
    /// We connect and receive the payload.
    Download,
}

#[derive(Debug)]
enum ChannelState {
    Listening(TcpListener),
    Connected(TcpStream),
    Taken,
    Closed,
}

impl ChannelState {
    fn describe(&self) -> &'static str {
        match self {
            ChannelState::Listening(_) => "listening",
            ChannelState::Connected(_) => "connected",
            ChannelState::Taken => "already in use",
            ChannelState::Closed => "closed",
        }
    }
}

/// One payload connection bound to a device.
#[derive(Debug)]
pub struct TransferChannel {
    device: DeviceId,
    role: ChannelRole,
    port: Option<u16>,
    state: ChannelState,
}

impl TransferChannel {
    /// Open an upload channel: bind the first free port in `ports`.
    ///
    /// The port to announce is available from [`local_port`](Self::local_port)
    /// right away; call [`accept`](Self::accept) to wait for the remote.
    pub async fn listen(device: DeviceId, ports: PortRange) -> Result<Self, ChannelError> {
        for port in ports.ports() {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    debug!(device = %device, port, "payload channel listening");
                    return Ok(Self {
                        device,
                        role: ChannelRole::Upload,
                        port: Some(port),
                        state: ChannelState::Listening(listener),
                    });
                }
                Err(e) => trace!(port, error = %e, "payload port unavailable"),
            }
        }
        Err(ChannelError::NoFreePort {
            start: ports.start,
            end: ports.end,
        })
    }

    /// Open a download channel by dialling the remote's payload port.
    pub async fn connect(device: DeviceId, addr: SocketAddr) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ChannelError::Connect { addr, source })?;
        debug!(device = %device, %addr, "payload channel connected");
        Ok(Self {
            device,
            role: ChannelRole::Download,
            port: None,
            state: ChannelState::Connected(stream),
        })
    }

    /// Wait for the remote to dial in on an upload channel.
    pub async fn accept(&mut self) -> Result<(), ChannelError> {
        let listener = match &self.state {
            ChannelState::Listening(listener) => listener,
            other => return Err(ChannelError::InvalidState(other.describe())),
        };
        let (stream, peer) = listener.accept().await.map_err(ChannelError::Accept)?;
        debug!(device = %self.device, %peer, "payload peer connected");
        self.state = ChannelState::Connected(stream);
        Ok(())
    }

    /// Hand the connected stream to a transfer. Only succeeds once.
    pub fn take_stream(&mut self) -> Result<TcpStream, ChannelError> {
        match std::mem::replace(&mut self.state, ChannelState::Taken) {
            ChannelState::Connected(stream) => Ok(stream),
            other => {
                let reason = other.describe();
                self.state = other;
                Err(ChannelError::InvalidState(reason))
            }
        }
    }

    /// Release the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if !matches!(self.state, ChannelState::Closed) {
            trace!(device = %self.device, "payload channel closed");
        }
        self.state = ChannelState::Closed;
    }

    /// Port announced to the remote, for upload channels.
    pub fn local_port(&self) -> Option<u16> {
        self.port
    }

    /// Device this channel belongs to.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Upload or download.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// True once the remote end is attached.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ChannelState::Connected(_))
    }
}
