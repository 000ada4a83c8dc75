//! CLI command implementations.

pub mod listen;
pub mod notifications;
pub mod settings;
pub mod share;

use anyhow::{bail, Context, Result};
use pairlink_client::{
    DeviceContext, DeviceSession, LanTransport, SessionEvent, Shared, Transport, TransferUpdate,
};
use pairlink_core::TransferState;
use pairlink_types::{DeviceId, TransferId};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Who we are talking to.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Device id used for logging and download subdirectories.
    pub device: String,
    /// User-visible name.
    pub name: Option<String>,
}

/// Build a session for `peer` over `transport`, with settings from `data_dir`.
pub fn session(
    data_dir: &Path,
    peer: &Peer,
    transport: Arc<dyn Transport>,
) -> Result<DeviceSession> {
    let settings = crate::config::open_settings(data_dir)?;
    let mut ctx = DeviceContext::new(DeviceId::new(peer.device.clone()), transport)
        .with_settings(Arc::new(settings));
    if let Some(name) = &peer.name {
        ctx = ctx.with_name(name.clone());
    }
    DeviceSession::new(ctx).context("Failed to start device session")
}

/// Connect to `addr` and build a session for it.
pub async fn connect(data_dir: &Path, peer: &Peer, addr: SocketAddr) -> Result<DeviceSession> {
    let transport = LanTransport::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    session(data_dir, peer, Arc::new(transport))
}

/// One line describing `event`, or `None` for events not worth printing.
pub fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::NotificationsChanged => None,
        SessionEvent::Transfer(TransferUpdate::Started { id, total_bytes }) => {
            Some(format!("[{}] started ({} bytes)", short(id), total_bytes))
        }
        SessionEvent::Transfer(TransferUpdate::Progress {
            id,
            bytes_transferred,
            total_bytes,
        }) => Some(format!(
            "[{}] {}%",
            short(id),
            percent(*bytes_transferred, *total_bytes)
        )),
        SessionEvent::Transfer(TransferUpdate::Settled { .. }) => None,
        SessionEvent::ShareSettled { id, state } => {
            Some(format!("[{}] {}", short(id), outcome(state)))
        }
        SessionEvent::Received(shared) => Some(format!("Received {}", shared_label(shared))),
        SessionEvent::Sent(shared) => Some(format!("Sent {}", shared_label(shared))),
        SessionEvent::LocalNotificationDismissed { id } => {
            Some(format!("Remote dismissed notification {}", id))
        }
    }
}

/// Print events until the channel closes.
pub async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for the share `id` to settle, printing other events on the way.
pub async fn wait_settled(
    events: &mut broadcast::Receiver<SessionEvent>,
    id: TransferId,
) -> Result<TransferState> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::ShareSettled { id: settled, state }) if settled == id => {
                return Ok(state)
            }
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                bail!("Session ended before transfer {} settled", id)
            }
        }
    }
}

fn outcome(state: &TransferState) -> String {
    match state {
        TransferState::Succeeded => "transfer successful".to_string(),
        TransferState::Cancelled => "transfer cancelled".to_string(),
        TransferState::Failed(cause) => format!("transfer failed: {}", cause),
        TransferState::Idle | TransferState::Started => "transfer pending".to_string(),
    }
}

fn shared_label(shared: &Shared) -> String {
    match shared {
        Shared::File(path) => format!("file {}", path.display()),
        Shared::Text(text) => format!("text \"{}\"", text),
        Shared::Url(url) => format!("url {}", url),
    }
}

fn percent(done: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        done.saturating_mul(100) / total
    }
}

fn short(id: &TransferId) -> String {
    id.to_string().chars().take(8).collect()
}
