//! DeviceSession - the main interface for one paired device.
//!
//! A session owns the plugins and the dispatcher for one device and offers
//! the operations callers need: feed packets in, request the remote's
//! notifications, share content and cancel transfers.
//!
//! # Architecture
//!
//! ```text
//! Transport → DeviceSession::run → PluginDispatcher → plugins
//!                                                       ↓
//!                                   pairlink-core (tracker, transfer FSM)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pairlink_client::{DeviceContext, DeviceSession, LanTransport};
//!
//! let transport = Arc::new(LanTransport::connect(addr).await?);
//! let session = DeviceSession::new(DeviceContext::new(device_id, transport))?;
//! session.share_text("hello").await?;
//! session.run().await?;
//! ```

use crate::context::{DeviceContext, SessionEvent};
use crate::error::PluginError;
use crate::plugin::{Dispatch, Plugin, PluginDispatcher};
use crate::plugins::{LocalNotification, NotificationPlugin, SharePlugin};
use crate::transport::TransportError;
use pairlink_core::NotificationRecord;
use pairlink_types::{Packet, TransferId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Session with one paired device.
pub struct DeviceSession {
    ctx: Arc<DeviceContext>,
    dispatcher: PluginDispatcher,
    notifications: Arc<NotificationPlugin>,
    share: Arc<SharePlugin>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("ctx", &self.ctx)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Create a session and start its plugin workers. Must be called within
    /// a Tokio runtime.
    pub fn new(ctx: DeviceContext) -> Result<Self, PluginError> {
        let ctx = Arc::new(ctx);
        let notifications = Arc::new(NotificationPlugin::new(Arc::clone(&ctx)));
        let share = Arc::new(SharePlugin::new(Arc::clone(&ctx)));

        let mut dispatcher = PluginDispatcher::new();
        dispatcher.register(Arc::clone(&notifications) as Arc<dyn Plugin>)?;
        dispatcher.register(Arc::clone(&share) as Arc<dyn Plugin>)?;

        Ok(Self {
            ctx,
            dispatcher,
            notifications,
            share,
        })
    }

    /// Device context.
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.ctx.subscribe()
    }

    /// Feed one packet and wait until its local effects are decided.
    ///
    /// Packets nobody handles are dropped and count as handled.
    pub async fn handle_incoming(&self, packet: Packet) -> Result<(), PluginError> {
        match self.dispatcher.dispatch(packet) {
            Dispatch::Queued(settlement) => settlement.settled().await,
            Dispatch::Dropped => Ok(()),
        }
    }

    /// Tell the plugins the control connection is up.
    pub async fn connected(&self) -> Result<(), PluginError> {
        self.notifications.connected().await?;
        self.share.connected().await
    }

    /// Receive and dispatch packets until the connection ends.
    ///
    /// Packets that fail to decode are logged and skipped. A clean close
    /// returns `Ok`; live transfers are cancelled either way.
    pub async fn run(&self) -> Result<(), TransportError> {
        if let Err(e) = self.connected().await {
            warn!(device = %self.ctx.device, error = %e, "connect hooks failed");
        }

        let result = loop {
            match self.ctx.transport.recv().await {
                Ok(packet) => {
                    if let Dispatch::Dropped = self.dispatcher.dispatch(packet) {
                        debug!(device = %self.ctx.device, "packet not handled");
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(device = %self.ctx.device, error = %e, "packet dropped");
                }
                Err(TransportError::ConnectionClosed) => {
                    info!(device = %self.ctx.device, "connection closed");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.ctx.transfers.close();
        result
    }

    /// Ask the remote to resend its current notifications.
    pub async fn request_remote_state(&self) -> Result<(), PluginError> {
        self.notifications.request().await
    }

    /// Tracked remote notifications.
    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.notifications().await
    }

    /// Offer a file to the remote.
    pub async fn share_file(&self, path: &str) -> Result<TransferId, PluginError> {
        self.share.share_file(path).await
    }

    /// Send text to the remote.
    pub async fn share_text(&self, text: &str) -> Result<(), PluginError> {
        self.share.share_text(text).await
    }

    /// Send a URL to the remote. `file://` URLs become file shares.
    pub async fn share_url(&self, url: &str) -> Result<Option<TransferId>, PluginError> {
        self.share.share_url(url).await
    }

    /// Cancel a live transfer. Returns false if it is not live.
    pub fn cancel_transfer(&self, id: &TransferId) -> bool {
        let found = self.ctx.transfers.cancel(id);
        debug!(transfer = %id, found, "cancel requested");
        found
    }

    /// Forward a local notification.
    pub async fn notify_local(&self, notification: LocalNotification) -> Result<bool, PluginError> {
        self.notifications.notify_local(notification).await
    }

    /// A forwarded local notification was closed.
    pub async fn withdraw_local(&self, id: &str) -> Result<(), PluginError> {
        self.notifications.withdraw_local(id).await
    }

    /// Reply to a repliable remote notification.
    pub async fn reply(&self, reply_id: &str, message: &str) -> Result<(), PluginError> {
        self.notifications.reply(reply_id, message).await
    }

    /// Close a remote notification.
    pub async fn close_notification(&self, identifier: &str) -> Result<(), PluginError> {
        self.notifications.close(identifier).await
    }

    /// Expect a remote duplicate of a local event.
    pub async fn track_duplicate(&self, record: NotificationRecord) -> Result<(), PluginError> {
        self.notifications.track_duplicate(record).await
    }

    /// Close the remote duplicate of a dismissed local event.
    pub async fn close_duplicate(&self, record: &NotificationRecord) -> Result<(), PluginError> {
        self.notifications.close_duplicate(record).await
    }

    /// Set or clear do-not-disturb.
    pub async fn set_do_not_disturb(&self, until: Option<i64>) -> Result<(), PluginError> {
        self.notifications.set_do_not_disturb(until).await
    }
}
