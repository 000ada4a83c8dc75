//! Payload channels wired to transfers.
//!
//! Glue shared by the plugins: prepare a [`Transfer`] registered with the
//! device's live-transfer map, then either dial the remote's payload port
//! (download) or wait for the remote on a listening channel (upload). Channel
//! setup is raced against cancellation and bounded by the configured timeout.

use crate::channel::TransferChannel;
use crate::context::{DeviceContext, SessionEvent};
use crate::error::PluginError;
use crate::transfer::Transfer;
use pairlink_core::TransferDescriptor;
use pairlink_types::Payload;
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Where to fetch `payload` from: the remote's address with the announced
/// port.
pub fn remote_addr(ctx: &DeviceContext, payload: &Payload) -> Result<SocketAddr, PluginError> {
    let peer = ctx.transport.peer_addr().ok_or(PluginError::NoPeerAddress)?;
    Ok(SocketAddr::new(peer.ip(), payload.transfer_info.port))
}

/// A transfer of `total_bytes`, registered for cancellation and reporting to
/// the session event channel.
pub fn prepare(ctx: &DeviceContext, total_bytes: u64, checksum: Option<String>) -> Transfer {
    let settings = ctx.settings.snapshot().transfer;
    let mut descriptor = TransferDescriptor::new(total_bytes);
    if let Some(checksum) = checksum {
        descriptor = descriptor.with_checksum(checksum);
    }
    let token = ctx.transfers.register(descriptor.id);
    let events = ctx.event_sender();

    Transfer::new(descriptor, settings.checksum)
        .with_chunk_size(settings.chunk_size)
        .with_stall_timeout(settings.timeout())
        .with_cancel_token(token)
        .with_observer(move |update| {
            let _ = events.send(SessionEvent::Transfer(update));
        })
}

/// Dial `addr` and copy the payload into `sink`.
pub async fn download<W>(
    ctx: &DeviceContext,
    transfer: Transfer,
    addr: SocketAddr,
    sink: W,
) -> TransferDescriptor
where
    W: AsyncWrite + Unpin,
{
    let id = transfer.id();
    let connect = TransferChannel::connect(ctx.device.clone(), addr);
    let ready = setup(ctx, &transfer, connect).await;
    let outcome = match ready {
        Setup::Ready(mut channel) => match channel.take_stream() {
            Ok(stream) => {
                let descriptor = transfer.run(stream, sink).await;
                channel.close();
                descriptor
            }
            Err(e) => transfer.fail(e.to_string()),
        },
        Setup::Failed(message) => transfer.fail(message),
        Setup::Cancelled => transfer.abandon(),
    };
    ctx.transfers.remove(&id);
    outcome
}

/// Wait for the remote on `channel` and copy `source` to it.
pub async fn upload<R>(
    ctx: &DeviceContext,
    transfer: Transfer,
    mut channel: TransferChannel,
    source: R,
) -> TransferDescriptor
where
    R: AsyncRead + Unpin,
{
    let id = transfer.id();
    let ready = setup(ctx, &transfer, channel.accept()).await;
    let outcome = match ready {
        Setup::Ready(()) => match channel.take_stream() {
            Ok(stream) => transfer.run(source, stream).await,
            Err(e) => transfer.fail(e.to_string()),
        },
        Setup::Failed(message) => transfer.fail(message),
        Setup::Cancelled => transfer.abandon(),
    };
    channel.close();
    ctx.transfers.remove(&id);
    outcome
}

enum Setup<T> {
    Ready(T),
    Failed(String),
    Cancelled,
}

async fn setup<T, E>(
    ctx: &DeviceContext,
    transfer: &Transfer,
    connect: impl Future<Output = Result<T, E>>,
) -> Setup<T>
where
    E: std::fmt::Display,
{
    let limit = ctx.settings.snapshot().transfer.timeout();
    let token = transfer.cancel_token();
    tokio::select! {
        _ = token.cancelled() => {
            debug!(transfer = %transfer.id(), "cancelled before the channel came up");
            Setup::Cancelled
        }
        result = tokio::time::timeout(limit, connect) => match result {
            Ok(Ok(ready)) => Setup::Ready(ready),
            Ok(Err(e)) => Setup::Failed(e.to_string()),
            Err(_) => Setup::Failed(format!("no connection within {}s", limit.as_secs())),
        },
    }
}
