//! Notification sync plugin.
//!
//! Receives the remote's notifications, deduplicates them through the
//! device's [`NotificationTracker`] and shows them via the presenter. Also
//! forwards local notifications to the remote and answers its requests.
//!
//! Incoming notification flow:
//!
//! ```text
//! packet → receive toggle → suppression → isCancel? → lookup
//!                                                       ↓ no match
//!                       icon download → contact → present → re-check → track
//! ```
//!
//! The lookup is repeated under the tracker lock right before tracking:
//! the icon download suspends the handler, and a placeholder may have been
//! added through the session API in the meantime.

use crate::context::{unix_now, DeviceContext, SessionEvent};
use crate::error::PluginError;
use crate::payload;
use crate::plugin::{Outbox, Plugin};
use crate::settings::ApplicationSettings;
use async_trait::async_trait;
use pairlink_core::{
    present, ChecksumAlgorithm, DoNotDisturb, Icon, MatchKind, NotificationKind,
    NotificationRecord, NotificationTracker, Presentation, Suppression, TrackerAction,
    TransferState,
};
use pairlink_types::{
    Body, NotificationBody, NotificationReply, NotificationRequest, Packet, PacketType, Payload,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INCOMING: &[PacketType] = &[PacketType::Notification, PacketType::NotificationRequest];
const OUTGOING: &[PacketType] = &[
    PacketType::Notification,
    PacketType::NotificationRequest,
    PacketType::NotificationReply,
];

/// A notification posted on this host, to forward to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalNotification {
    /// Posting application.
    pub app_name: String,
    /// Local id; `0` or empty means the notification cannot be replaced.
    pub id: String,
    /// Text shown by the remote.
    pub ticker: String,
    /// Themed icon name the application used.
    pub icon_name: Option<String>,
    /// Icon file to upload with the notification.
    pub icon_path: Option<PathBuf>,
}

/// Notification sync for one device.
pub struct NotificationPlugin {
    ctx: Arc<DeviceContext>,
    outbox: Outbox,
    tracker: tokio::sync::Mutex<NotificationTracker>,
    dnd: Arc<Mutex<DoNotDisturb>>,
    dnd_timer: Mutex<Option<JoinHandle<()>>>,
    forwarded: Mutex<BTreeMap<String, NotificationBody>>,
}

impl std::fmt::Debug for NotificationPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPlugin")
            .field("device", &self.ctx.device)
            .field("dnd", &*lock(&self.dnd))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NotificationPlugin {
    /// Plugin for the device in `ctx`. Do-not-disturb starts from the
    /// persisted setting; a window still open gets its expiry timer, so this
    /// must be called within a Tokio runtime.
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        let until = ctx.settings.snapshot().notifications.do_not_disturb_until;
        let outbox = Outbox::new("notification", OUTGOING, Arc::clone(&ctx.transport));
        let dnd = Arc::new(Mutex::new(DoNotDisturb::new(until)));

        let now = unix_now();
        let timer = until.filter(|u| *u > now).map(|until| {
            spawn_dnd_expiry(Arc::clone(&dnd), Arc::clone(&ctx), outbox.clone(), until, now)
        });

        Self {
            ctx,
            outbox,
            tracker: tokio::sync::Mutex::new(NotificationTracker::new()),
            dnd,
            dnd_timer: Mutex::new(timer),
            forwarded: Mutex::new(BTreeMap::new()),
        }
    }

    /// Snapshot of the tracked records.
    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.tracker.lock().await.records().to_vec()
    }

    /// Ask the remote to resend all of its notifications.
    pub async fn request(&self) -> Result<(), PluginError> {
        debug!(device = %self.ctx.device, "requesting remote notifications");
        self.outbox
            .send(&Packet::new(NotificationRequest::resend_all()))
            .await
    }

    /// Close a remote notification by its remote id, local id or timestamp.
    pub async fn close(&self, identifier: &str) -> Result<(), PluginError> {
        let actions = self.tracker.lock().await.close(identifier);
        if actions.is_empty() {
            debug!(identifier, "close: not tracked");
        }
        self.apply(actions).await
    }

    /// Expect a remote notification that duplicates a local event, e.g. a
    /// missed call already reported through telephony.
    pub async fn track_duplicate(&self, record: NotificationRecord) -> Result<(), PluginError> {
        let actions = self.tracker.lock().await.track_duplicate(record);
        self.apply(actions).await
    }

    /// The local copy of a duplicate was dismissed; close the remote copy now
    /// or as soon as it arrives.
    pub async fn close_duplicate(&self, record: &NotificationRecord) -> Result<(), PluginError> {
        let actions = self.tracker.lock().await.close_duplicate(record);
        self.apply(actions).await
    }

    /// Answer a notification that carried a `requestReplyId`.
    pub async fn reply(&self, reply_id: &str, message: &str) -> Result<(), PluginError> {
        let body = NotificationReply {
            reply_id: reply_id.to_string(),
            message_body: message.to_string(),
            ..Default::default()
        };
        self.outbox.send(&Packet::new(body)).await
    }

    /// Forward a local notification. Returns false when forwarding is off
    /// globally or for this application.
    ///
    /// Applications seen for the first time are remembered, enabled.
    pub async fn notify_local(&self, local: LocalNotification) -> Result<bool, PluginError> {
        if local.app_name.is_empty() {
            return Ok(false);
        }

        let known = self
            .ctx
            .settings
            .snapshot()
            .notifications
            .applications
            .contains_key(&local.app_name);
        if !known {
            let entry = ApplicationSettings {
                icon_name: local.icon_name.clone().unwrap_or_default(),
                enabled: true,
            };
            self.ctx.settings.update(&mut |s| {
                s.notifications
                    .applications
                    .entry(local.app_name.clone())
                    .or_insert_with(|| entry.clone());
            })?;
        }

        let settings = self.ctx.settings.snapshot();
        let enabled = settings
            .notifications
            .applications
            .get(&local.app_name)
            .is_some_and(|a| a.enabled);
        if !settings.notifications.send_notifications || !enabled {
            debug!(app = %local.app_name, "local notification not forwarded");
            return Ok(false);
        }

        let mut body = NotificationBody {
            id: local.id.clone(),
            app_name: Some(local.app_name.clone()),
            ticker: Some(local.ticker.clone()),
            is_clearable: Some(!local.id.is_empty() && local.id != "0"),
            ..Default::default()
        };
        lock(&self.forwarded).insert(local.id.clone(), body.clone());

        match local.icon_path {
            Some(path) => {
                self.send_with_icon(&mut body, &path, settings.transfer.checksum)
                    .await?
            }
            None => self.outbox.send(&Packet::new(body)).await?,
        }
        Ok(true)
    }

    /// The local notification `id` was closed; tell the remote.
    pub async fn withdraw_local(&self, id: &str) -> Result<(), PluginError> {
        if lock(&self.forwarded).remove(id).is_some() {
            self.outbox
                .send(&Packet::new(NotificationBody::cancel(id)))
                .await?;
        }
        Ok(())
    }

    /// Set or clear the do-not-disturb window (unix seconds).
    ///
    /// Ending the window, now or when it elapses, asks the remote for the
    /// notifications that were held back.
    pub async fn set_do_not_disturb(&self, until: Option<i64>) -> Result<(), PluginError> {
        let now = unix_now();
        let rerequest = lock(&self.dnd).set(until, now);
        self.ctx
            .settings
            .update(&mut |s| s.notifications.do_not_disturb_until = until)?;

        if let Some(timer) = lock(&self.dnd_timer).take() {
            timer.abort();
        }
        if let Some(until) = until.filter(|u| *u > now) {
            let timer = spawn_dnd_expiry(
                Arc::clone(&self.dnd),
                Arc::clone(&self.ctx),
                self.outbox.clone(),
                until,
                now,
            );
            *lock(&self.dnd_timer) = Some(timer);
        }

        info!(device = %self.ctx.device, ?until, "do-not-disturb changed");
        if rerequest && self.receiving() {
            self.request().await?;
        }
        Ok(())
    }

    /// Whether presentation is currently held back.
    pub fn do_not_disturb(&self) -> bool {
        lock(&self.dnd).is_active(unix_now())
    }

    fn receiving(&self) -> bool {
        self.ctx.settings.snapshot().notifications.receive_notifications
    }

    async fn receive(&self, packet: &Packet, body: &NotificationBody) -> Result<(), PluginError> {
        if !self.receiving() {
            debug!("receiving notifications is off");
            return Ok(());
        }
        if let Some(reason) = Suppression::for_remote_id(&body.id) {
            debug!(id = %body.id, ?reason, "notification suppressed");
            return Ok(());
        }

        let query = NotificationRecord::from_body(body);
        if body.is_cancel {
            self.ctx.presenter.withdraw(&self.ctx.device, &body.id).await;
            let actions = self.tracker.lock().await.untrack(&query);
            return self.apply(actions).await;
        }

        let found = self.tracker.lock().await.find(&query);
        if let Some(found) = found {
            let update = found.kind == MatchKind::RemoteId && found.changed && !found.closed;
            self.apply(found.actions).await?;
            if update && !self.do_not_disturb() {
                debug!(id = %body.id, "notification updated");
                let presentation = self.presentation(packet, body, &found.record).await;
                self.ctx
                    .presenter
                    .show(&self.ctx.device, &presentation)
                    .await;
            } else {
                debug!(id = %body.id, kind = ?found.kind, "known notification ignored");
            }
            return Ok(());
        }

        let presentation = if self.do_not_disturb() {
            debug!(id = %body.id, "do-not-disturb: tracked without showing");
            None
        } else {
            Some(self.presentation(packet, body, &query).await)
        };

        let actions = {
            let mut tracker = self.tracker.lock().await;
            match tracker.find(&query) {
                Some(found) => {
                    debug!(id = %body.id, "notification matched while preparing it");
                    drop(tracker);
                    return self.apply(found.actions).await;
                }
                None => tracker.track(query),
            }
        };
        self.apply(actions).await?;

        if let Some(presentation) = presentation {
            self.ctx
                .presenter
                .show(&self.ctx.device, &presentation)
                .await;
        }
        Ok(())
    }

    async fn presentation(
        &self,
        packet: &Packet,
        body: &NotificationBody,
        record: &NotificationRecord,
    ) -> Presentation {
        let downloaded = match packet.payload() {
            Some(p) => self.download_icon(p, body.payload_hash.clone()).await,
            None => None,
        };

        let kind = NotificationKind::of(record);
        let contact = match kind.contact_query(record) {
            Some(query) => self.ctx.contacts.lookup(query).await,
            None => None,
        };

        let mut icon = None;
        if let Some(contact) = &contact {
            match (&contact.avatar, &downloaded) {
                (None, Some(bytes)) => match self.cache_avatar(bytes).await {
                    Ok(path) => {
                        self.ctx.contacts.set_avatar(contact, &path).await;
                        icon = Some(Icon::File(path));
                    }
                    Err(e) => warn!(error = %e, "could not cache contact avatar"),
                },
                (Some(avatar), None) => icon = Some(Icon::File(avatar.clone())),
                _ => {}
            }
        }
        let icon = icon.or_else(|| downloaded.map(Icon::Bytes));

        present(record, contact.as_ref(), icon, self.ctx.origin())
    }

    /// Fetch the icon payload. Any failure falls back to a themed icon.
    async fn download_icon(&self, payload: &Payload, checksum: Option<String>) -> Option<Vec<u8>> {
        let addr = match payload::remote_addr(&self.ctx, payload) {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "icon not downloaded");
                return None;
            }
        };
        let transfer = payload::prepare(&self.ctx, payload.size, checksum);
        let mut icon = Vec::new();
        let result = payload::download(&self.ctx, transfer, addr, &mut icon).await;
        match result.state {
            TransferState::Succeeded => Some(icon),
            other => {
                debug!(state = ?other, "icon download failed, using themed icon");
                None
            }
        }
    }

    async fn cache_avatar(&self, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let dir = self.ctx.settings.snapshot().contacts.avatar_cache_directory;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.jpeg", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn send_with_icon(
        &self,
        body: &mut NotificationBody,
        path: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> Result<(), PluginError> {
        let bytes = tokio::fs::read(path).await?;
        body.payload_hash = Some(algorithm.digest(&bytes));

        let ports = self.ctx.settings.snapshot().transfer.payload_ports;
        let channel =
            crate::channel::TransferChannel::listen(self.ctx.device.clone(), ports).await?;
        let port = channel.local_port().ok_or(crate::channel::ChannelError::InvalidState(
            "not listening",
        ))?;

        let packet = Packet::new(body.clone()).with_payload(Payload::new(bytes.len() as u64, port));
        let transfer = payload::prepare(&self.ctx, bytes.len() as u64, None);
        let id = transfer.id();
        if let Err(e) = self.outbox.send(&packet).await {
            self.ctx.transfers.remove(&id);
            return Err(e);
        }

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let result = payload::upload(&ctx, transfer, channel, &bytes[..]).await;
            debug!(transfer = %id, state = ?result.state, "icon upload settled");
        });
        Ok(())
    }

    async fn answer(&self, request: &NotificationRequest) -> Result<(), PluginError> {
        if request.request {
            if !self.ctx.settings.snapshot().notifications.send_notifications {
                return Ok(());
            }
            let bodies: Vec<_> = lock(&self.forwarded).values().cloned().collect();
            debug!(count = bodies.len(), "resending forwarded notifications");
            for body in bodies {
                self.outbox.send(&Packet::new(body)).await?;
            }
        }
        if let Some(id) = &request.cancel {
            if lock(&self.forwarded).remove(id).is_some() {
                self.ctx
                    .emit(SessionEvent::LocalNotificationDismissed { id: id.clone() });
            }
        }
        Ok(())
    }

    async fn apply(&self, actions: Vec<TrackerAction>) -> Result<(), PluginError> {
        for action in actions {
            match action {
                TrackerAction::ListChanged => self.ctx.emit(SessionEvent::NotificationsChanged),
                TrackerAction::RequestClose { remote_id } => {
                    debug!(id = %remote_id, "asking remote to close notification");
                    self.outbox
                        .send(&Packet::new(NotificationRequest::cancel(remote_id)))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for NotificationPlugin {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.dnd_timer).take() {
            timer.abort();
        }
    }
}

/// Leave do-not-disturb at `until` and ask the remote for what was held back.
fn spawn_dnd_expiry(
    dnd: Arc<Mutex<DoNotDisturb>>,
    ctx: Arc<DeviceContext>,
    outbox: Outbox,
    until: i64,
    now: i64,
) -> JoinHandle<()> {
    let wait = Duration::from_secs(until.saturating_sub(now).max(0) as u64);

    tokio::spawn(async move {
        tokio::time::sleep(wait).await;
        if !lock(&dnd).expire(unix_now().max(until)) {
            return;
        }
        debug!(device = %ctx.device, "do-not-disturb elapsed");
        if let Err(e) = ctx
            .settings
            .update(&mut |s| s.notifications.do_not_disturb_until = None)
        {
            warn!(error = %e, "could not persist do-not-disturb expiry");
        }
        if ctx.settings.snapshot().notifications.receive_notifications {
            if let Err(e) = outbox
                .send(&Packet::new(NotificationRequest::resend_all()))
                .await
            {
                warn!(error = %e, "could not request missed notifications");
            }
        }
    })
}

#[async_trait]
impl Plugin for NotificationPlugin {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn incoming_types(&self) -> &'static [PacketType] {
        INCOMING
    }

    fn outgoing_types(&self) -> &'static [PacketType] {
        OUTGOING
    }

    async fn handle(&self, packet: Packet) -> Result<(), PluginError> {
        match packet.body() {
            Body::Notification(body) => self.receive(&packet, body).await,
            Body::NotificationRequest(request) => self.answer(request).await,
            _ => Err(PluginError::UnexpectedBody(packet.wire_type().to_string())),
        }
    }

    async fn connected(&self) -> Result<(), PluginError> {
        if self.receiving() {
            self.request().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::StaticContacts;
    use crate::presenter::MockPresenter;
    use crate::settings::{MemorySettingsStore, Settings};
    use crate::transport::MockTransport;
    use pairlink_core::Contact;
    use pairlink_types::DeviceId;
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    struct Harness {
        plugin: NotificationPlugin,
        transport: MockTransport,
        presenter: MockPresenter,
        ctx: Arc<DeviceContext>,
    }

    fn harness_with(settings: Settings, contacts: StaticContacts) -> Harness {
        let transport = MockTransport::new();
        transport.set_peer_addr(SocketAddr::from(([127, 0, 0, 1], 1716)));
        let presenter = MockPresenter::new();
        let ctx = Arc::new(
            DeviceContext::new(DeviceId::new("phone"), Arc::new(transport.clone()))
                .with_name("Pixel")
                .with_presenter(Arc::new(presenter.clone()))
                .with_contacts(Arc::new(contacts))
                .with_settings(Arc::new(MemorySettingsStore::new(settings))),
        );
        Harness {
            plugin: NotificationPlugin::new(Arc::clone(&ctx)),
            transport,
            presenter,
            ctx,
        }
    }

    fn harness() -> Harness {
        harness_with(Settings::default(), StaticContacts::default())
    }

    fn incoming(body: serde_json::Value) -> Packet {
        let raw = serde_json::json!({"id": 1, "type": "kdeconnect.notification", "body": body});
        Packet::from_slice(raw.to_string().as_bytes()).unwrap()
    }

    fn cancel_requests(transport: &MockTransport) -> Vec<String> {
        transport
            .sent_of_type(PacketType::NotificationRequest)
            .iter()
            .filter_map(|p| p.as_notification_request().and_then(|r| r.cancel.clone()))
            .collect()
    }

    // ===========================================
    // Receiving
    // ===========================================

    #[tokio::test]
    async fn new_notification_is_tracked_and_shown_once() {
        let h = harness();
        let packet = incoming(serde_json::json!({
            "id": "42", "appName": "Mail", "ticker": "New message", "time": 1000
        }));

        h.plugin.handle(packet.clone()).await.unwrap();
        h.plugin.handle(packet).await.unwrap();

        let records = h.plugin.notifications().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("42"));
        assert!(records[0].local_id.is_none());

        let shown = h.presenter.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Mail");
        assert_eq!(shown[0].body, "New message");
    }

    #[tokio::test]
    async fn cancel_withdraws_and_untracks() {
        let h = harness();
        h.plugin
            .handle(incoming(serde_json::json!({
                "id": "42", "appName": "Mail", "ticker": "New message", "time": 1000
            })))
            .await
            .unwrap();
        h.plugin
            .handle(incoming(serde_json::json!({"id": 42, "isCancel": true})))
            .await
            .unwrap();

        assert!(h.plugin.notifications().await.is_empty());
        assert_eq!(h.presenter.withdrawn(), vec!["42".to_string()]);
    }

    #[tokio::test]
    async fn suppressed_ids_never_reach_tracker_or_presenter() {
        let h = harness();
        for id in ["0|com.app|GroupSummary|1", "0|com.sms:sms|thread"] {
            h.plugin
                .handle(incoming(serde_json::json!({"id": id, "ticker": "x", "time": 5})))
                .await
                .unwrap();
        }
        assert!(h.plugin.notifications().await.is_empty());
        assert!(h.presenter.shown().is_empty());
    }

    #[tokio::test]
    async fn receive_toggle_off_ignores_everything() {
        let mut settings = Settings::default();
        settings.notifications.receive_notifications = false;
        let h = harness_with(settings, StaticContacts::default());

        h.plugin
            .handle(incoming(serde_json::json!({"id": "1", "ticker": "x", "time": 5})))
            .await
            .unwrap();
        h.plugin.connected().await.unwrap();

        assert!(h.plugin.notifications().await.is_empty());
        assert!(h.transport.sent_packets().is_empty());
    }

    #[tokio::test]
    async fn placeholder_merges_with_remote_copy() {
        let h = harness();
        h.plugin
            .track_duplicate(NotificationRecord::placeholder("L1", "Missed call"))
            .await
            .unwrap();
        h.plugin
            .handle(incoming(serde_json::json!({
                "id": "7", "ticker": "Missed call", "time": 2000, "title": "Missed call"
            })))
            .await
            .unwrap();

        let records = h.plugin.notifications().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].local_id.as_deref(), Some("L1"));
        assert_eq!(records[0].time.as_deref(), Some("2000"));
        assert!(h.presenter.shown().is_empty());
    }

    #[tokio::test]
    async fn closed_placeholder_is_closed_when_remote_copy_arrives() {
        let h = harness();
        let placeholder = NotificationRecord::placeholder("L1", "Missed call");
        h.plugin.track_duplicate(placeholder.clone()).await.unwrap();
        h.plugin.close_duplicate(&placeholder).await.unwrap();
        assert!(cancel_requests(&h.transport).is_empty());

        h.plugin
            .handle(incoming(serde_json::json!({
                "id": "7", "ticker": "Missed call", "time": 2000
            })))
            .await
            .unwrap();

        assert_eq!(cancel_requests(&h.transport), vec!["7".to_string()]);
        assert!(h.plugin.notifications().await.is_empty());
        assert!(h.presenter.shown().is_empty());
    }

    #[tokio::test]
    async fn changed_update_is_shown_again() {
        let h = harness();
        h.plugin
            .handle(incoming(serde_json::json!({
                "id": "9", "appName": "Chat", "ticker": "hi", "time": 1
            })))
            .await
            .unwrap();
        h.plugin
            .handle(incoming(serde_json::json!({"id": "9", "ticker": "hi again"})))
            .await
            .unwrap();
        h.plugin
            .handle(incoming(serde_json::json!({"id": "9", "ticker": "hi again"})))
            .await
            .unwrap();

        let shown = h.presenter.shown_with_id("9");
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].body, "hi again");
        assert_eq!(h.plugin.notifications().await.len(), 1);
    }

    // ===========================================
    // Do-not-disturb
    // ===========================================

    #[tokio::test]
    async fn do_not_disturb_tracks_without_showing() {
        let mut settings = Settings::default();
        settings.notifications.do_not_disturb_until = Some(unix_now() + 3600);
        let h = harness_with(settings, StaticContacts::default());
        assert!(h.plugin.do_not_disturb());

        h.plugin
            .handle(incoming(serde_json::json!({"id": "1", "ticker": "x", "time": 5})))
            .await
            .unwrap();

        assert_eq!(h.plugin.notifications().await.len(), 1);
        assert!(h.presenter.shown().is_empty());
    }

    #[tokio::test]
    async fn clearing_do_not_disturb_requests_missed_notifications() {
        let mut settings = Settings::default();
        settings.notifications.do_not_disturb_until = Some(unix_now() + 3600);
        let h = harness_with(settings, StaticContacts::default());

        h.plugin.set_do_not_disturb(None).await.unwrap();

        assert!(!h.plugin.do_not_disturb());
        assert_eq!(h.ctx.settings.snapshot().notifications.do_not_disturb_until, None);
        let requests = h.transport.sent_of_type(PacketType::NotificationRequest);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].as_notification_request().unwrap().request);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_do_not_disturb_requests_missed_notifications() {
        let h = harness();
        h.plugin
            .set_do_not_disturb(Some(unix_now() + 60))
            .await
            .unwrap();
        assert!(h.transport.sent_packets().is_empty());

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(h.transport.sent_of_type(PacketType::NotificationRequest).len(), 1);
        assert_eq!(h.ctx.settings.snapshot().notifications.do_not_disturb_until, None);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_do_not_disturb_expires_and_requests() {
        let mut settings = Settings::default();
        settings.notifications.do_not_disturb_until = Some(unix_now() + 60);
        let h = harness_with(settings, StaticContacts::default());
        assert!(h.plugin.do_not_disturb());

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let requests = h.transport.sent_of_type(PacketType::NotificationRequest);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].as_notification_request().unwrap().request);
        assert_eq!(h.ctx.settings.snapshot().notifications.do_not_disturb_until, None);
    }

    #[tokio::test(start_paused = true)]
    async fn past_persisted_window_starts_no_timer() {
        let mut settings = Settings::default();
        settings.notifications.do_not_disturb_until = Some(unix_now() - 10);
        let h = harness_with(settings, StaticContacts::default());

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(!h.plugin.do_not_disturb());
        assert!(h.transport.sent_packets().is_empty());
    }

    // ===========================================
    // Closing and replying
    // ===========================================

    #[tokio::test]
    async fn close_twice_sends_one_cancel() {
        let h = harness();
        h.plugin
            .handle(incoming(serde_json::json!({"id": "42", "ticker": "x", "time": 1000})))
            .await
            .unwrap();

        h.plugin.close("1000").await.unwrap();
        h.plugin.close("1000").await.unwrap();

        assert_eq!(cancel_requests(&h.transport), vec!["42".to_string()]);
        assert!(h.plugin.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn reply_quotes_reply_id() {
        let h = harness();
        h.plugin.reply("uuid-1", "on my way").await.unwrap();

        let sent = h.transport.last_sent().unwrap();
        let reply = sent.as_notification_reply().unwrap();
        assert_eq!(reply.reply_id, "uuid-1");
        assert_eq!(reply.message_body, "on my way");
    }

    // ===========================================
    // Icons and contacts
    // ===========================================

    /// Serve `bytes` once on a loopback port.
    async fn serve_icon(bytes: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(bytes).await.unwrap();
        });
        port
    }

    fn with_icon(body: serde_json::Value, size: usize, port: u16) -> Packet {
        let raw = serde_json::json!({
            "id": 1,
            "type": "kdeconnect.notification",
            "body": body,
            "payloadSize": size,
            "payloadTransferInfo": {"port": port}
        });
        Packet::from_slice(raw.to_string().as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn downloaded_icon_is_used() {
        let h = harness();
        const ICON: &[u8] = b"png bytes";
        let port = serve_icon(ICON).await;
        let hash = ChecksumAlgorithm::Md5.digest(ICON);

        h.plugin
            .handle(with_icon(
                serde_json::json!({"id": "1", "appName": "Mail", "ticker": "x", "time": 1, "payloadHash": hash}),
                ICON.len(),
                port,
            ))
            .await
            .unwrap();

        assert_eq!(h.presenter.shown()[0].icon, Icon::Bytes(ICON.to_vec()));
    }

    #[tokio::test]
    async fn corrupt_icon_falls_back_to_themed() {
        let h = harness();
        const ICON: &[u8] = b"png bytes";
        let port = serve_icon(ICON).await;

        h.plugin
            .handle(with_icon(
                serde_json::json!({"id": "1", "appName": "Mail", "ticker": "x", "time": 1, "payloadHash": "00"}),
                ICON.len(),
                port,
            ))
            .await
            .unwrap();

        let shown = h.presenter.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(
            shown[0].icon,
            Icon::Themed(vec!["mail".into(), "phone-symbolic".into()])
        );
    }

    #[tokio::test]
    async fn icon_is_cached_as_contact_avatar() {
        let cache = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.contacts.avatar_cache_directory = cache.path().to_path_buf();
        let contacts = StaticContacts::new(vec![Contact {
            name: Some("Alice".into()),
            numbers: vec![],
            avatar: None,
        }]);
        let h = harness_with(settings, contacts.clone());

        const ICON: &[u8] = b"jpeg bytes";
        let port = serve_icon(ICON).await;
        h.plugin
            .handle(with_icon(
                serde_json::json!({"id": "0|sms|1", "title": "Alice", "text": "hey", "time": 1}),
                ICON.len(),
                port,
            ))
            .await
            .unwrap();

        let avatar = contacts.avatar_of("Alice").expect("avatar recorded");
        assert!(avatar.starts_with(cache.path()));
        assert_eq!(std::fs::read(&avatar).unwrap(), ICON);

        let shown = &h.presenter.shown()[0];
        assert_eq!(shown.title, "Alice");
        assert_eq!(shown.icon, Icon::File(avatar));
    }

    // ===========================================
    // Forwarding local notifications
    // ===========================================

    fn local(app: &str, id: &str) -> LocalNotification {
        LocalNotification {
            app_name: app.into(),
            id: id.into(),
            ticker: "Build finished".into(),
            icon_name: Some("terminal".into()),
            icon_path: None,
        }
    }

    #[tokio::test]
    async fn local_notifications_are_forwarded_and_apps_remembered() {
        let h = harness();
        assert!(h.plugin.notify_local(local("Terminal", "5")).await.unwrap());

        let sent = h.transport.last_sent().unwrap();
        let body = sent.as_notification().unwrap();
        assert_eq!(body.id, "5");
        assert_eq!(body.app_name.as_deref(), Some("Terminal"));
        assert_eq!(body.is_clearable, Some(true));

        let apps = h.ctx.settings.snapshot().notifications.applications;
        assert_eq!(apps["Terminal"].icon_name, "terminal");
        assert!(apps["Terminal"].enabled);
    }

    #[tokio::test]
    async fn disabled_app_is_not_forwarded() {
        let mut settings = Settings::default();
        settings.notifications.applications.insert(
            "Terminal".into(),
            ApplicationSettings {
                icon_name: String::new(),
                enabled: false,
            },
        );
        let h = harness_with(settings, StaticContacts::default());

        assert!(!h.plugin.notify_local(local("Terminal", "5")).await.unwrap());
        assert!(!h.plugin.notify_local(local("", "6")).await.unwrap());
        assert!(h.transport.sent_packets().is_empty());
    }

    #[tokio::test]
    async fn remote_request_resends_and_cancel_dismisses() {
        let h = harness();
        let mut events = h.ctx.subscribe();
        h.plugin.notify_local(local("Terminal", "5")).await.unwrap();
        h.transport.reset();

        h.plugin
            .handle(Packet::new(NotificationRequest::resend_all()))
            .await
            .unwrap();
        assert_eq!(h.transport.sent_of_type(PacketType::Notification).len(), 1);

        h.plugin
            .handle(Packet::new(NotificationRequest::cancel("5")))
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LocalNotificationDismissed { id: "5".into() }
        );
    }

    #[tokio::test]
    async fn local_icon_is_uploaded_with_hash() {
        use tokio::io::AsyncReadExt;

        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("terminal.png");
        std::fs::write(&icon, b"icon").unwrap();

        let h = harness();
        let mut notification = local("Terminal", "5");
        notification.icon_path = Some(icon);
        h.plugin.notify_local(notification).await.unwrap();

        let sent = h.transport.last_sent().unwrap();
        assert_eq!(
            sent.as_notification().unwrap().payload_hash.as_deref(),
            Some(ChecksumAlgorithm::Md5.digest(b"icon").as_str())
        );
        let payload = sent.payload().unwrap();
        assert_eq!(payload.size, 4);

        let mut stream =
            tokio::net::TcpStream::connect(("127.0.0.1", payload.transfer_info.port))
                .await
                .unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"icon");
    }

    #[tokio::test]
    async fn withdraw_local_sends_cancel_once() {
        let h = harness();
        h.plugin.notify_local(local("Terminal", "5")).await.unwrap();
        h.plugin.withdraw_local("5").await.unwrap();
        h.plugin.withdraw_local("5").await.unwrap();

        let cancels: Vec<_> = h
            .transport
            .sent_of_type(PacketType::Notification)
            .into_iter()
            .filter(|p| p.as_notification().is_some_and(|b| b.is_cancel))
            .collect();
        assert_eq!(cancels.len(), 1);
    }
}
