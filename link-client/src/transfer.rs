//! Payload transfer driver.
//!
//! [`Transfer`] runs the pure [`TransferDescriptor`] state machine from
//! pairlink-core over real I/O: it copies exactly `total_bytes` from a reader
//! to a writer in chunks, hashes what it copies when a checksum is expected,
//! and reports progress and the terminal state to an observer.
//!
//! ```text
//! reader → [chunk] → writer
//!             ↓
//!      TransferDescriptor (pure state machine)
//! ```
//!
//! Cancellation is cooperative. The token is checked between chunks and
//! raced against every pending read, write and flush, so a cancel request
//! settles as `Cancelled` even when the peer has stalled or gone away.

use dashmap::DashMap;
use pairlink_core::{
    ChecksumAlgorithm, ChecksumHasher, TransferAction, TransferDescriptor, TransferEvent,
    TransferState,
};
use pairlink_types::TransferId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// What a transfer reports while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    /// Copying began.
    Started {
        /// Transfer id.
        id: TransferId,
        /// Bytes expected.
        total_bytes: u64,
    },
    /// A chunk was copied.
    Progress {
        /// Transfer id.
        id: TransferId,
        /// Bytes copied so far.
        bytes_transferred: u64,
        /// Bytes expected.
        total_bytes: u64,
    },
    /// The transfer reached a terminal state. Sent exactly once.
    Settled {
        /// Transfer id.
        id: TransferId,
        /// Terminal state.
        state: TransferState,
    },
}

type Observer = Box<dyn Fn(TransferUpdate) + Send + Sync>;

/// Why an I/O operation did not complete.
#[derive(Debug)]
enum Interrupt {
    Cancelled,
    Failed(String),
}

impl Interrupt {
    fn into_event(self) -> TransferEvent {
        match self {
            Interrupt::Cancelled => TransferEvent::CancelRequested,
            Interrupt::Failed(message) => TransferEvent::IoFailed { message },
        }
    }
}

/// One chunked copy.
pub struct Transfer {
    descriptor: TransferDescriptor,
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
    stall_timeout: Option<Duration>,
    cancel: CancellationToken,
    observer: Option<Observer>,
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("descriptor", &self.descriptor)
            .field("algorithm", &self.algorithm)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl Transfer {
    /// Prepare a transfer. Nothing happens until [`run`](Self::run).
    pub fn new(descriptor: TransferDescriptor, algorithm: ChecksumAlgorithm) -> Self {
        Self {
            descriptor,
            algorithm,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stall_timeout: None,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    /// Copy at most `chunk_size` bytes per step.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail if a single read or write takes longer than `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receive progress and the terminal state.
    pub fn with_observer(mut self, observer: impl Fn(TransferUpdate) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Transfer id.
    pub fn id(&self) -> TransferId {
        self.descriptor.id
    }

    /// Token that cancels this transfer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Settle without copying: the channel never came up.
    pub fn fail(mut self, message: impl Into<String>) -> TransferDescriptor {
        self.step(TransferEvent::IoFailed {
            message: message.into(),
        });
        self.descriptor
    }

    /// Settle without copying: cancelled while waiting for the channel.
    pub fn abandon(mut self) -> TransferDescriptor {
        self.step(TransferEvent::CancelRequested);
        self.descriptor
    }

    /// Copy `total_bytes` from `reader` to `writer` and return the settled
    /// descriptor.
    pub async fn run<R, W>(mut self, mut reader: R, mut writer: W) -> TransferDescriptor
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut hasher: Option<ChecksumHasher> = self
            .descriptor
            .needs_digest()
            .then(|| self.algorithm.hasher());
        let mut buf = vec![0u8; self.chunk_size];

        if self.cancel.is_cancelled() {
            self.step(TransferEvent::CancelRequested);
            return self.descriptor;
        }
        let mut finalize = self.step(TransferEvent::Start);

        while !self.descriptor.state.is_terminal() {
            if self.cancel.is_cancelled() {
                self.step(TransferEvent::CancelRequested);
                break;
            }

            if finalize {
                let event = match self.io(writer.flush()).await {
                    Ok(()) => TransferEvent::CopyFinished {
                        digest: hasher.take().map(ChecksumHasher::finalize),
                    },
                    Err(interrupt) => interrupt.into_event(),
                };
                self.step(event);
                continue;
            }

            let remaining = usize::try_from(self.descriptor.remaining()).unwrap_or(usize::MAX);
            let want = remaining.min(buf.len());
            let event = match self.io(reader.read(&mut buf[..want])).await {
                Ok(0) => TransferEvent::StreamEnded,
                Ok(n) => match self.io(writer.write_all(&buf[..n])).await {
                    Ok(()) => {
                        if let Some(hasher) = hasher.as_mut() {
                            hasher.update(&buf[..n]);
                        }
                        TransferEvent::ChunkCopied { len: n as u64 }
                    }
                    Err(interrupt) => interrupt.into_event(),
                },
                Err(interrupt) => interrupt.into_event(),
            };
            finalize = self.step(event);
        }

        self.descriptor
    }

    /// Run one I/O operation under the stall timeout, racing the cancel
    /// token. A result that lands after the token fired counts as cancelled.
    async fn io<T>(
        &self,
        op: impl std::future::Future<Output = std::io::Result<T>>,
    ) -> Result<T, Interrupt> {
        let guarded = async {
            match self.stall_timeout {
                Some(limit) => match tokio::time::timeout(limit, op).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("stalled for {:?}", limit)),
                },
                None => op.await.map_err(|e| e.to_string()),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            result = guarded => {
                if self.cancel.is_cancelled() {
                    return Err(Interrupt::Cancelled);
                }
                result.map_err(Interrupt::Failed)
            }
        }
    }

    /// Feed one event; returns true when the copy should be finalized.
    fn step(&mut self, event: TransferEvent) -> bool {
        let (next, actions) = self.descriptor.clone().on_event(event);
        self.descriptor = next;

        let id = self.descriptor.id;
        let mut finalize = false;
        for action in actions {
            match action {
                TransferAction::BeginCopy => {
                    debug!(transfer = %id, total_bytes = self.descriptor.total_bytes, "transfer started");
                    self.emit(TransferUpdate::Started {
                        id,
                        total_bytes: self.descriptor.total_bytes,
                    });
                }
                TransferAction::ReportProgress {
                    bytes_transferred,
                    total_bytes,
                } => {
                    trace!(transfer = %id, bytes_transferred, total_bytes, "transfer progress");
                    self.emit(TransferUpdate::Progress {
                        id,
                        bytes_transferred,
                        total_bytes,
                    });
                }
                TransferAction::Finalize => finalize = true,
                TransferAction::Settled(state) => {
                    match &state {
                        TransferState::Succeeded => info!(transfer = %id, "transfer succeeded"),
                        TransferState::Failed(cause) => {
                            warn!(transfer = %id, %cause, "transfer failed")
                        }
                        TransferState::Cancelled => info!(transfer = %id, "transfer cancelled"),
                        _ => {}
                    }
                    self.emit(TransferUpdate::Settled { id, state });
                }
            }
        }
        finalize
    }

    fn emit(&self, update: TransferUpdate) {
        if let Some(observer) = &self.observer {
            observer(update);
        }
    }
}

/// Live transfers of one device, keyed by id, for cancellation.
#[derive(Debug, Clone, Default)]
pub struct TransferRegistry {
    live: Arc<DashMap<TransferId, CancellationToken>>,
    closed: Arc<AtomicBool>,
}

impl TransferRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transfer; returns the token that cancels it.
    ///
    /// After [`close`](Self::close) the token comes back already cancelled.
    pub fn register(&self, id: TransferId) -> CancellationToken {
        let token = CancellationToken::new();
        self.live.insert(id, token.clone());
        if self.closed.load(Ordering::SeqCst) {
            token.cancel();
        }
        token
    }

    /// Request cancellation. Returns false if the transfer is not live.
    pub fn cancel(&self, id: &TransferId) -> bool {
        match self.live.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a settled transfer.
    pub fn remove(&self, id: &TransferId) {
        self.live.remove(id);
    }

    /// Whether a transfer is live.
    pub fn contains(&self, id: &TransferId) -> bool {
        self.live.contains_key(id)
    }

    /// Number of live transfers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Cancel everything currently live.
    pub fn cancel_all(&self) {
        for entry in self.live.iter() {
            entry.value().cancel();
        }
    }

    /// Cancel everything and refuse new transfers. Called on disconnect.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel_all();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
