//! Share plugin: files, text and URLs in both directions.
//!
//! Files travel as the packet payload over a [`TransferChannel`]. Receiving
//! and sending both run in a spawned task so the plugin's queue keeps moving
//! while a large file is in flight; progress and the final status are shown
//! through the presenter under the transfer id. A received file that does not
//! arrive completely is deleted.

use crate::channel::TransferChannel;
use crate::context::{DeviceContext, SessionEvent, Shared};
use crate::error::PluginError;
use crate::payload;
use crate::plugin::{Outbox, Plugin};
use async_trait::async_trait;
use pairlink_core::{Icon, Presentation, Priority, TransferState};
use pairlink_types::{Packet, PacketType, Payload, ShareContent, ShareRequest, TransferId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TYPES: &[PacketType] = &[PacketType::ShareRequest];

/// Icon of transfer status notifications.
pub const TRANSFER_ICON: &str = "send-to-symbolic";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Receiving,
    Sending,
}

impl Direction {
    fn started(self, file: &str, device: &str) -> String {
        match self {
            Direction::Receiving => format!("Receiving \"{}\" from {}", file, device),
            Direction::Sending => format!("Sending \"{}\" to {}", file, device),
        }
    }

    fn succeeded(self, file: &str, device: &str) -> String {
        match self {
            Direction::Receiving => format!("Received \"{}\" from {}", file, device),
            Direction::Sending => format!("Sent \"{}\" to {}", file, device),
        }
    }

    fn failed(self, file: &str, device: &str, cause: &str) -> String {
        match self {
            Direction::Receiving => {
                format!("Failed to receive \"{}\" from {}: {}", file, device, cause)
            }
            Direction::Sending => format!("Failed to send \"{}\" to {}: {}", file, device, cause),
        }
    }

    fn cancelled(self, file: &str, device: &str) -> String {
        match self {
            Direction::Receiving => format!("Cancelled transfer of \"{}\" from {}", file, device),
            Direction::Sending => format!("Cancelled transfer of \"{}\" to {}", file, device),
        }
    }
}

fn status(id: TransferId, title: &str, body: String) -> Presentation {
    Presentation {
        id: id.to_string(),
        app_name: "pairlink".to_string(),
        title: title.to_string(),
        body,
        icon: Icon::Themed(vec![TRANSFER_ICON.to_string()]),
        priority: Priority::Normal,
        silent: true,
        reply_id: None,
    }
}

/// Show the terminal status of a file transfer and clean up after it.
async fn finish(
    ctx: &DeviceContext,
    id: TransferId,
    direction: Direction,
    file: &str,
    partial: Option<&Path>,
    state: TransferState,
) {
    let device = ctx.name.as_str();
    let presentation = match &state {
        TransferState::Succeeded => status(id, "Transfer Successful", direction.succeeded(file, device)),
        TransferState::Failed(cause) => status(
            id,
            "Transfer Failed",
            direction.failed(file, device, &cause.to_string()),
        ),
        _ => status(id, "Transfer Cancelled", direction.cancelled(file, device)),
    };

    if state != TransferState::Succeeded {
        if let Some(path) = partial {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "partial file removed"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial file"),
            }
        }
    }

    ctx.presenter.withdraw(&ctx.device, &id.to_string()).await;
    ctx.presenter.show(&ctx.device, &presentation).await;
    ctx.emit(SessionEvent::ShareSettled { id, state });
}

/// Pick a path in `dir` for `filename` that does not exist yet: `name`,
/// then `name (1)`, `name (2)`, and so on.
pub async fn unique_path(dir: &Path, filename: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let base = dir.join(filename);
    let mut candidate = base.clone();
    let mut copy = 0;
    while tokio::fs::try_exists(&candidate).await? {
        copy += 1;
        candidate = PathBuf::from(format!("{} ({})", base.display(), copy));
    }
    Ok(candidate)
}

/// Keep only the last path component of a name chosen by the remote.
fn safe_file_name(filename: &str) -> &str {
    let name = filename
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("");
    match name {
        "" | "." | ".." => "download",
        name => name,
    }
}

/// File, text and URL sharing for one device.
pub struct SharePlugin {
    ctx: Arc<DeviceContext>,
    outbox: Outbox,
}

impl std::fmt::Debug for SharePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharePlugin")
            .field("device", &self.ctx.device)
            .finish_non_exhaustive()
    }
}

impl SharePlugin {
    /// Plugin for the device in `ctx`.
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        let outbox = Outbox::new("share", TYPES, Arc::clone(&ctx.transport));
        Self { ctx, outbox }
    }

    /// Offer a local file. Accepts plain paths and `file://` URIs.
    ///
    /// Returns once the offer is sent; the bytes move when the remote
    /// connects. The returned id can be passed to `cancel_transfer`.
    pub async fn share_file(&self, path: &str) -> Result<TransferId, PluginError> {
        let path = PathBuf::from(path.strip_prefix("file://").unwrap_or(path));
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let ports = self.ctx.settings.snapshot().transfer.payload_ports;
        let channel = TransferChannel::listen(self.ctx.device.clone(), ports).await?;
        let port = channel
            .local_port()
            .ok_or(crate::channel::ChannelError::InvalidState("not listening"))?;

        let transfer = payload::prepare(&self.ctx, size, None);
        let id = transfer.id();
        let packet = Packet::new(ShareRequest::file(name.clone())).with_payload(Payload::new(size, port));
        if let Err(e) = self.outbox.send(&packet).await {
            self.ctx.transfers.remove(&id);
            return Err(e);
        }

        info!(transfer = %id, file = %name, size, "sharing file");
        self.ctx
            .presenter
            .show(
                &self.ctx.device,
                &status(id, "Starting Transfer", Direction::Sending.started(&name, &self.ctx.name)),
            )
            .await;

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let result = payload::upload(&ctx, transfer, channel, file).await;
            if result.state == TransferState::Succeeded {
                ctx.emit(SessionEvent::Sent(Shared::File(path)));
            }
            finish(&ctx, id, Direction::Sending, &name, None, result.state).await;
        });
        Ok(id)
    }

    /// Share a piece of text.
    pub async fn share_text(&self, text: &str) -> Result<(), PluginError> {
        self.outbox.send(&Packet::new(ShareRequest::text(text))).await?;
        self.ctx.emit(SessionEvent::Sent(Shared::Text(text.to_string())));
        Ok(())
    }

    /// Share a URL. `file://` URIs are shared as files and return the
    /// transfer id; bare hosts get an `https://` scheme.
    pub async fn share_url(&self, url: &str) -> Result<Option<TransferId>, PluginError> {
        if url.starts_with("file://") {
            return self.share_file(url).await.map(Some);
        }
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        self.outbox.send(&Packet::new(ShareRequest::url(url.clone()))).await?;
        self.ctx.emit(SessionEvent::Sent(Shared::Url(url)));
        Ok(None)
    }

    async fn receive_file(&self, packet: &Packet, filename: &str) -> Result<(), PluginError> {
        let payload = packet
            .payload()
            .ok_or(PluginError::MissingPayload(PacketType::ShareRequest))?;
        let addr = payload::remote_addr(&self.ctx, payload)?;

        let settings = self.ctx.settings.snapshot().share;
        let mut dir = settings.download_directory;
        if settings.download_subdirectory {
            dir.push(safe_file_name(&self.ctx.name));
        }
        let name = safe_file_name(filename).to_string();
        let path = unique_path(&dir, &name).await?;
        let file = tokio::fs::File::create(&path).await?;

        let transfer = payload::prepare(&self.ctx, payload.size, None);
        let id = transfer.id();
        info!(transfer = %id, file = %path.display(), size = payload.size, "receiving file");
        self.ctx
            .presenter
            .show(
                &self.ctx.device,
                &status(id, "Starting Transfer", Direction::Receiving.started(&name, &self.ctx.name)),
            )
            .await;

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let result = payload::download(&ctx, transfer, addr, file).await;
            if result.state == TransferState::Succeeded {
                ctx.emit(SessionEvent::Received(Shared::File(path.clone())));
            }
            finish(&ctx, id, Direction::Receiving, &name, Some(path.as_path()), result.state).await;
        });
        Ok(())
    }
}

#[async_trait]
impl Plugin for SharePlugin {
    fn name(&self) -> &'static str {
        "share"
    }

    fn incoming_types(&self) -> &'static [PacketType] {
        TYPES
    }

    fn outgoing_types(&self) -> &'static [PacketType] {
        TYPES
    }

    async fn handle(&self, packet: Packet) -> Result<(), PluginError> {
        let Some(request) = packet.as_share_request() else {
            return Err(PluginError::UnexpectedBody(packet.wire_type().to_string()));
        };
        match &request.content {
            ShareContent::File { filename } => self.receive_file(&packet, filename).await,
            ShareContent::Text { text } => {
                debug!(len = text.len(), "text received");
                self.ctx.emit(SessionEvent::Received(Shared::Text(text.clone())));
                Ok(())
            }
            ShareContent::Url { url } => {
                debug!(%url, "url received");
                self.ctx.emit(SessionEvent::Received(Shared::Url(url.clone())));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::MockPresenter;
    use crate::settings::{MemorySettingsStore, PortRange, Settings};
    use crate::transport::MockTransport;
    use pairlink_types::DeviceId;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;

    struct Harness {
        plugin: SharePlugin,
        transport: MockTransport,
        presenter: MockPresenter,
        ctx: Arc<DeviceContext>,
        _dir: tempfile::TempDir,
    }

    fn harness(subdirectory: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.share.download_directory = dir.path().to_path_buf();
        settings.share.download_subdirectory = subdirectory;
        settings.transfer.transfer_timeout_secs = 5;

        let transport = MockTransport::new();
        transport.set_peer_addr(SocketAddr::from(([127, 0, 0, 1], 1716)));
        let presenter = MockPresenter::new();
        let ctx = Arc::new(
            DeviceContext::new(DeviceId::new("phone"), Arc::new(transport.clone()))
                .with_name("Pixel")
                .with_presenter(Arc::new(presenter.clone()))
                .with_settings(Arc::new(MemorySettingsStore::new(settings))),
        );
        Harness {
            plugin: SharePlugin::new(Arc::clone(&ctx)),
            transport,
            presenter,
            ctx,
            _dir: dir,
        }
    }

    fn download_dir(h: &Harness) -> PathBuf {
        h.ctx.settings.snapshot().share.download_directory
    }

    async fn settled(events: &mut broadcast::Receiver<SessionEvent>) -> TransferState {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(SessionEvent::ShareSettled { state, .. }) = events.recv().await {
                    return state;
                }
            }
        })
        .await
        .expect("share settled")
    }

    fn file_offer(name: &str, size: u64, port: u16) -> Packet {
        Packet::new(ShareRequest::file(name)).with_payload(Payload::new(size, port))
    }

    // ===========================================
    // Receiving files
    // ===========================================

    #[tokio::test]
    async fn receives_file_into_download_dir() {
        let h = harness(false);
        let mut events = h.ctx.subscribe();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"hello world").await.unwrap();
        });

        h.plugin.handle(file_offer("notes.txt", 11, port)).await.unwrap();
        assert_eq!(settled(&mut events).await, TransferState::Succeeded);

        let path = download_dir(&h).join("notes.txt");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");

        let shown = h.presenter.shown();
        assert_eq!(shown[0].title, "Starting Transfer");
        assert_eq!(shown[0].body, "Receiving \"notes.txt\" from Pixel");
        let last = shown.last().unwrap();
        assert_eq!(last.title, "Transfer Successful");
        assert_eq!(last.body, "Received \"notes.txt\" from Pixel");
        assert_eq!(last.icon, Icon::Themed(vec![TRANSFER_ICON.into()]));
    }

    #[tokio::test]
    async fn truncated_file_is_deleted() {
        let h = harness(false);
        let mut events = h.ctx.subscribe();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"hel").await.unwrap();
        });

        h.plugin.handle(file_offer("notes.txt", 11, port)).await.unwrap();
        assert!(matches!(settled(&mut events).await, TransferState::Failed(_)));

        assert!(!download_dir(&h).join("notes.txt").exists());
        let last = h.presenter.shown().pop().unwrap();
        assert_eq!(last.title, "Transfer Failed");
        assert!(last.body.starts_with("Failed to receive \"notes.txt\" from Pixel: "));
    }

    #[tokio::test]
    async fn cancelled_file_is_deleted() {
        let h = harness(false);
        let mut events = h.ctx.subscribe();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (go, wait) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"hel").await.unwrap();
            let _ = wait.await;
            let _ = s.write_all(b"lo").await;
        });

        h.plugin.handle(file_offer("notes.txt", 11, port)).await.unwrap();
        let id = loop {
            if let Ok(SessionEvent::Transfer(crate::transfer::TransferUpdate::Progress {
                id, ..
            })) = events.recv().await
            {
                break id;
            }
        };
        assert!(h.ctx.transfers.cancel(&id));
        let _ = go.send(());

        assert_eq!(settled(&mut events).await, TransferState::Cancelled);
        assert!(!download_dir(&h).join("notes.txt").exists());
        assert_eq!(h.presenter.shown().pop().unwrap().title, "Transfer Cancelled");
    }

    #[tokio::test]
    async fn name_collisions_get_numbered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::write(dir.path().join("a.txt (1)"), b"").unwrap();

        let path = unique_path(dir.path(), "a.txt").await.unwrap();
        assert_eq!(path, dir.path().join("a.txt (2)"));
    }

    #[tokio::test]
    async fn subdirectory_per_device() {
        let h = harness(true);
        let mut events = h.ctx.subscribe();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"x").await.unwrap();
        });

        h.plugin.handle(file_offer("../x.bin", 1, port)).await.unwrap();
        settled(&mut events).await;
        assert!(download_dir(&h).join("Pixel").join("x.bin").exists());
    }

    #[tokio::test]
    async fn file_offer_without_payload_is_an_error() {
        let h = harness(false);
        let err = h
            .plugin
            .handle(Packet::new(ShareRequest::file("a.txt")))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::MissingPayload(_)));
    }

    #[tokio::test]
    async fn text_and_url_are_reported() {
        let h = harness(false);
        let mut events = h.ctx.subscribe();
        h.plugin.handle(Packet::new(ShareRequest::text("hi"))).await.unwrap();
        h.plugin
            .handle(Packet::new(ShareRequest::url("https://example.com")))
            .await
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Received(Shared::Text("hi".into())));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Received(Shared::Url("https://example.com".into()))
        );
    }

    // ===========================================
    // Sending
    // ===========================================

    async fn free_ports() -> PortRange {
        let scout = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let start = scout.local_addr().unwrap().port();
        drop(scout);
        PortRange {
            start,
            end: start.saturating_add(4),
        }
    }

    #[tokio::test]
    async fn share_file_serves_bytes_to_remote() {
        let h = harness(false);
        let ports = free_ports().await;
        h.ctx
            .settings
            .update(&mut |s| s.transfer.payload_ports = ports)
            .unwrap();
        let mut events = h.ctx.subscribe();

        let source = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(source.path(), b"file body").unwrap();
        let uri = format!("file://{}", source.path().display());

        let id = h.plugin.share_file(&uri).await.unwrap();
        let offer = h.transport.last_sent().unwrap();
        let payload = offer.payload().unwrap();
        assert_eq!(payload.size, 9);
        assert!(matches!(
            offer.as_share_request().unwrap().content,
            ShareContent::File { .. }
        ));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", payload.transfer_info.port))
            .await
            .unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"file body");

        assert_eq!(settled(&mut events).await, TransferState::Succeeded);
        assert_eq!(h.presenter.shown_with_id(&id.to_string()).len(), 2);
    }

    #[tokio::test]
    async fn share_url_adds_scheme() {
        let h = harness(false);
        assert_eq!(h.plugin.share_url("example.com").await.unwrap(), None);
        h.plugin.share_url("http://example.com").await.unwrap();

        let urls: Vec<_> = h
            .transport
            .sent_packets()
            .iter()
            .filter_map(|p| match &p.as_share_request()?.content {
                ShareContent::Url { url } => Some(url.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(urls, vec!["https://example.com", "http://example.com"]);
    }

    #[tokio::test]
    async fn share_text_is_sent() {
        let h = harness(false);
        h.plugin.share_text("hello").await.unwrap();
        let sent = h.transport.last_sent().unwrap();
        assert_eq!(
            sent.as_share_request().unwrap().content,
            ShareContent::Text { text: "hello".into() }
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let h = harness(false);
        let err = h.plugin.share_file("/definitely/not/here").await.unwrap_err();
        assert!(matches!(err, PluginError::Io(_)));
        assert!(h.transport.sent_packets().is_empty());
    }

    #[test]
    fn remote_file_names_stay_inside_download_dir() {
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("dir\\name.txt"), "name.txt");
        assert_eq!(safe_file_name(".."), "download");
        assert_eq!(safe_file_name(""), "download");
    }
}
