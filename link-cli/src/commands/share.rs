//! Share a file, text or URL with a peer.

use anyhow::{bail, Result};
use pairlink_client::{DeviceSession, SessionEvent};
use pairlink_core::TransferState;
use pairlink_types::TransferId;
use tokio::sync::broadcast;

use super::wait_settled;

/// What to share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Local file path.
    File(String),
    /// Plain text.
    Text(String),
    /// URL. `file://` URLs are sent as files.
    Url(String),
}

/// Run the share command against an established session.
pub async fn run(session: &DeviceSession, content: Content) -> Result<()> {
    let mut events = session.subscribe();

    let id = match &content {
        Content::File(path) => Some(session.share_file(path).await?),
        Content::Text(text) => {
            session.share_text(text).await?;
            None
        }
        Content::Url(url) => session.share_url(url).await?,
    };

    let Some(id) = id else {
        println!("Shared.");
        return Ok(());
    };

    println!("Offered transfer {}", id);
    match settle(session, &mut events, id).await? {
        TransferState::Succeeded => {
            println!("Transfer successful.");
            Ok(())
        }
        TransferState::Cancelled => bail!("Transfer cancelled"),
        TransferState::Failed(cause) => bail!("Transfer failed: {}", cause),
        state => bail!("Transfer stopped in state {:?}", state),
    }
}

/// Drive the session until transfer `id` settles or Ctrl-C cancels it.
async fn settle(
    session: &DeviceSession,
    events: &mut broadcast::Receiver<SessionEvent>,
    id: TransferId,
) -> Result<TransferState> {
    let settled = tokio::select! {
        state = wait_settled(events, id) => Some(state?),
        result = session.run() => {
            result?;
            None
        }
        _ = tokio::signal::ctrl_c() => {
            session.cancel_transfer(&id);
            None
        }
    };

    // The connection ended first; live transfers were cancelled and will
    // still report their outcome.
    match settled {
        Some(state) => Ok(state),
        None => wait_settled(events, id).await,
    }
}
