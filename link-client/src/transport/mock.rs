//! Mock transport for testing.
//!
//! Allows queueing incoming packets and capturing sent packets for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use pairlink_types::{Packet, PacketType};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock transport for testing.
///
/// Starts connected. Clones share state, so a test can keep one handle while
/// the session owns another.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    connected: bool,
    peer_addr: Option<SocketAddr>,
    sent_packets: Vec<Packet>,
    receive_queue: VecDeque<Packet>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl Default for MockTransportInner {
    fn default() -> Self {
        Self {
            connected: true,
            peer_addr: None,
            sent_packets: Vec::new(),
            receive_queue: VecDeque::new(),
            fail_next_send: None,
            fail_next_recv: None,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a new, connected mock transport.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }

    /// Report `addr` as the peer address.
    pub fn set_peer_addr(&self, addr: SocketAddr) {
        self.lock().peer_addr = Some(addr);
    }

    /// Queue a packet to be returned by the next `recv()` call.
    pub fn queue_packet(&self, packet: Packet) {
        self.lock().receive_queue.push_back(packet);
    }

    /// Get all packets that were sent.
    pub fn sent_packets(&self) -> Vec<Packet> {
        self.lock().sent_packets.clone()
    }

    /// Sent packets of one type.
    pub fn sent_of_type(&self, packet_type: PacketType) -> Vec<Packet> {
        self.lock()
            .sent_packets
            .iter()
            .filter(|p| p.packet_type() == Some(packet_type))
            .cloned()
            .collect()
    }

    /// Get the last packet that was sent.
    pub fn last_sent(&self) -> Option<Packet> {
        self.lock().sent_packets.last().cloned()
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_string());
    }

    /// Clear all state (packets, queue) and reconnect.
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, packet: &Packet) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_packets.push(packet.clone());
        Ok(())
    }

    async fn recv(&self) -> Result<Packet, TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_recv.take() {
            return Err(TransportError::ReceiveFailed(error));
        }

        inner
            .receive_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock().peer_addr
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_types::{NotificationRequest, ShareRequest};

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_starts_connected() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());
        assert!(transport.peer_addr().is_none());
    }

    #[tokio::test]
    async fn mock_transport_records_sent_packets() {
        let transport = MockTransport::new();

        transport
            .send(&Packet::new(ShareRequest::text("one")))
            .await
            .unwrap();
        transport
            .send(&Packet::new(NotificationRequest::resend_all()))
            .await
            .unwrap();

        assert_eq!(transport.sent_packets().len(), 2);
        assert_eq!(transport.sent_of_type(PacketType::ShareRequest).len(), 1);
        assert_eq!(
            transport.last_sent().unwrap().packet_type(),
            Some(PacketType::NotificationRequest)
        );
    }

    #[tokio::test]
    async fn mock_transport_receives_in_order() {
        let transport = MockTransport::new();
        transport.queue_packet(Packet::new(ShareRequest::text("first")).with_id(1));
        transport.queue_packet(Packet::new(ShareRequest::text("second")).with_id(2));

        assert_eq!(transport.recv().await.unwrap().id(), 1);
        assert_eq!(transport.recv().await.unwrap().id(), 2);
    }

    #[tokio::test]
    async fn mock_transport_recv_empty_returns_closed() {
        let transport = MockTransport::new();

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn mock_transport_closes() {
        let transport = MockTransport::new();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        let result = transport.send(&Packet::new(ShareRequest::text("x"))).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn forced_send_failure() {
        let transport = MockTransport::new();
        transport.fail_next_send("buffer full");

        let packet = Packet::new(ShareRequest::text("x"));
        let result = transport.send(&packet).await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        // Next send should work
        transport.send(&packet).await.unwrap();
        assert_eq!(transport.sent_packets().len(), 1);
    }

    #[tokio::test]
    async fn forced_recv_failure() {
        let transport = MockTransport::new();
        transport.queue_packet(Packet::new(ShareRequest::text("x")));
        transport.fail_next_recv("timeout");

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));

        // Next recv should get the queued packet
        assert!(transport.recv().await.is_ok());
    }

    #[tokio::test]
    async fn clone_shares_state_and_reset_clears_it() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1
            .send(&Packet::new(ShareRequest::text("from t1")))
            .await
            .unwrap();
        assert_eq!(transport2.sent_packets().len(), 1);

        transport2.close().await.unwrap();
        assert!(!transport1.is_connected());

        transport1.reset();
        assert!(transport2.is_connected());
        assert!(transport2.sent_packets().is_empty());
    }
}
