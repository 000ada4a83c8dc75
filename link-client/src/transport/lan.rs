//! LAN transport: newline-delimited JSON packets over TCP.

use super::{Transport, TransportError};
use async_trait::async_trait;
use pairlink_types::Packet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::debug;

/// Maximum size of one packet line.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Control connection to one device over TCP.
#[derive(Debug)]
pub struct LanTransport {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    peer: SocketAddr,
    connected: AtomicBool,
}

impl LanTransport {
    /// Dial a device.
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        Self::from_stream(stream)
    }

    /// Wait for one device to dial in on `listener`.
    pub async fn accept(listener: &TcpListener) -> Result<Self, TransportError> {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Self::from_stream(stream)
    }

    /// Wrap an established connection.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        let (read, write) = stream.into_split();
        debug!(%peer, "control connection established");
        Ok(Self {
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
            peer,
            connected: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Transport for LanTransport {
    async fn send(&self, packet: &Packet) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let line = packet.to_line()?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<Packet, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();

        loop {
            line.clear();
            let limit = MAX_PACKET_SIZE as u64 + 1;
            let read = (&mut *reader)
                .take(limit)
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

            if read == 0 {
                self.connected.store(false, Ordering::SeqCst);
                return Err(TransportError::ConnectionClosed);
            }
            if line.len() > MAX_PACKET_SIZE {
                self.connected.store(false, Ordering::SeqCst);
                return Err(TransportError::TooLarge {
                    size: line.len(),
                    max: MAX_PACKET_SIZE,
                });
            }
            // Keep-alive blank lines
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Packet::from_slice(&line)?);
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_types::{NotificationRequest, PacketType, ShareRequest};

    async fn pair() -> (LanTransport, LanTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(LanTransport::connect(addr), async {
            LanTransport::accept(&listener).await
        });
        (client.unwrap(), server.unwrap())
    }

    #[tokio::test]
    async fn packets_cross_the_wire_in_order() {
        let (a, b) = pair().await;

        a.send(&Packet::new(ShareRequest::text("hello")).with_id(1))
            .await
            .unwrap();
        a.send(&Packet::new(NotificationRequest::resend_all()).with_id(2))
            .await
            .unwrap();

        let first = b.recv().await.unwrap();
        let second = b.recv().await.unwrap();
        assert_eq!(first.id(), 1);
        assert_eq!(first.packet_type(), Some(PacketType::ShareRequest));
        assert_eq!(second.packet_type(), Some(PacketType::NotificationRequest));
    }

    #[tokio::test]
    async fn malformed_line_is_recoverable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut raw = TcpStream::connect(addr).await.unwrap();
        let transport = LanTransport::accept(&listener).await.unwrap();

        raw.write_all(b"{broken\n\n{\"id\":3,\"type\":\"kdeconnect.share.request\",\"body\":{\"text\":\"ok\"}}\n")
            .await
            .unwrap();

        let err = transport.recv().await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(transport.is_connected());

        let packet = transport.recv().await.unwrap();
        assert_eq!(packet.id(), 3);
    }

    #[tokio::test]
    async fn peer_hangup_closes() {
        let (a, b) = pair().await;
        a.close().await.unwrap();
        assert!(!a.is_connected());

        assert!(matches!(
            b.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(!b.is_connected());
    }

    #[tokio::test]
    async fn reports_peer_address() {
        let (a, b) = pair().await;
        assert_eq!(a.peer_addr().unwrap().ip(), b.peer_addr().unwrap().ip());
    }
}
