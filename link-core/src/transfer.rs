//! Payload transfer state machine.
//!
//! Pure bookkeeping for one chunked copy of a known number of bytes. The
//! client owns the socket and the sink; it feeds events in and carries out
//! the returned actions.
//!
//! ```text
//! Idle --Start--> Started --(all bytes, digest ok)--> Succeeded
//!                    |
//!                    +--(io error / short stream / bad digest)--> Failed
//!                    +--(cancel)--> Cancelled
//! ```
//!
//! Terminal states are sticky: once reached, every later event is ignored
//! and no further actions are produced, so observers hear about the outcome
//! exactly once.

use crate::checksum::digests_match;
use pairlink_types::TransferId;
use thiserror::Error;

/// Why a transfer failed.
///
/// The `Display` text is the cause shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    /// Connect, read or write failed.
    #[error("Connection lost: {0}")]
    Io(String),

    /// The stream closed before every byte arrived.
    #[error("Connection lost after {received} of {expected} bytes")]
    Truncated {
        /// Bytes copied before the stream ended.
        received: u64,
        /// Bytes announced.
        expected: u64,
    },

    /// All bytes arrived but the digest did not match.
    #[error("File corrupted: checksum mismatch (expected {expected}, got {actual})")]
    Integrity {
        /// Digest announced by the sender.
        expected: String,
        /// Digest computed over the received bytes.
        actual: String,
    },
}

impl TransferFailure {
    /// True for integrity failures, false for connection-level ones.
    pub fn is_integrity(&self) -> bool {
        matches!(self, TransferFailure::Integrity { .. })
    }
}

/// Lifecycle of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Copying chunks.
    Started,
    /// Every byte copied and verified.
    Succeeded,
    /// Stopped on an error.
    Failed(TransferFailure),
    /// Stopped on request.
    Cancelled,
}

impl TransferState {
    /// Whether this state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Succeeded | TransferState::Failed(_) | TransferState::Cancelled
        )
    }
}

/// Inputs to the transfer state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Begin copying.
    Start,
    /// One chunk was written to the sink.
    ChunkCopied {
        /// Bytes in the chunk.
        len: u64,
    },
    /// The copy loop stopped after `total_bytes`; carries the computed digest
    /// when a checksum is expected.
    CopyFinished {
        /// Digest over every copied byte.
        digest: Option<String>,
    },
    /// The source reached end of stream early.
    StreamEnded,
    /// A read or write failed.
    IoFailed {
        /// Human readable cause.
        message: String,
    },
    /// Cancellation was observed at a chunk boundary.
    CancelRequested,
}

/// Work for the driver to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAction {
    /// Start the chunked copy.
    BeginCopy,
    /// Publish progress.
    ReportProgress {
        /// Bytes copied so far.
        bytes_transferred: u64,
        /// Bytes expected in total.
        total_bytes: u64,
    },
    /// Every byte is in; stop reading and compute the digest.
    Finalize,
    /// The transfer settled. Emitted once per transfer.
    Settled(TransferState),
}

/// One transfer and its progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// Correlation key for UI actions such as cancel.
    pub id: TransferId,
    /// Bytes expected, known up front.
    pub total_bytes: u64,
    /// Digest the copied bytes must match, if the sender supplied one.
    pub expected_checksum: Option<String>,
    /// Bytes copied so far. Never decreases.
    pub bytes_transferred: u64,
    /// Current state.
    pub state: TransferState,
}

impl TransferDescriptor {
    /// A new idle transfer of `total_bytes`.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            id: TransferId::new(),
            total_bytes,
            expected_checksum: None,
            bytes_transferred: 0,
            state: TransferState::Idle,
        }
    }

    /// Use a caller-chosen id.
    pub fn with_id(mut self, id: TransferId) -> Self {
        self.id = id;
        self
    }

    /// Require the copied bytes to hash to `checksum`.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    /// Bytes still to copy.
    pub fn remaining(&self) -> u64 {
        self.total_bytes.saturating_sub(self.bytes_transferred)
    }

    /// Whether the copied bytes must be hashed.
    pub fn needs_digest(&self) -> bool {
        self.expected_checksum.is_some()
    }

    /// Process an event and return the updated transfer plus actions to execute.
    ///
    /// This is a pure function. The caller performs the I/O.
    pub fn on_event(mut self, event: TransferEvent) -> (Self, Vec<TransferAction>) {
        match (std::mem::take(&mut self.state), event) {
            // From Idle
            (TransferState::Idle, TransferEvent::Start) => {
                self.state = TransferState::Started;
                let mut actions = vec![TransferAction::BeginCopy];
                if self.total_bytes == 0 {
                    actions.push(TransferAction::Finalize);
                }
                (self, actions)
            }
            (TransferState::Idle, TransferEvent::CancelRequested) => {
                self.settle(TransferState::Cancelled)
            }
            // The channel never connected
            (TransferState::Idle, TransferEvent::IoFailed { message }) => {
                self.settle(TransferState::Failed(TransferFailure::Io(message)))
            }

            // From Started
            (TransferState::Started, TransferEvent::ChunkCopied { len }) => {
                self.state = TransferState::Started;
                self.bytes_transferred = self
                    .bytes_transferred
                    .saturating_add(len)
                    .min(self.total_bytes);
                let mut actions = vec![TransferAction::ReportProgress {
                    bytes_transferred: self.bytes_transferred,
                    total_bytes: self.total_bytes,
                }];
                if self.remaining() == 0 {
                    actions.push(TransferAction::Finalize);
                }
                (self, actions)
            }
            (TransferState::Started, TransferEvent::CopyFinished { digest }) => {
                if self.remaining() > 0 {
                    let failure = TransferFailure::Truncated {
                        received: self.bytes_transferred,
                        expected: self.total_bytes,
                    };
                    return self.settle(TransferState::Failed(failure));
                }
                let outcome = match (&self.expected_checksum, digest) {
                    (Some(expected), Some(actual)) if !digests_match(expected, &actual) => {
                        TransferState::Failed(TransferFailure::Integrity {
                            expected: expected.clone(),
                            actual,
                        })
                    }
                    (Some(expected), None) => TransferState::Failed(TransferFailure::Integrity {
                        expected: expected.clone(),
                        actual: String::new(),
                    }),
                    _ => TransferState::Succeeded,
                };
                self.settle(outcome)
            }
            (TransferState::Started, TransferEvent::StreamEnded) => {
                let failure = TransferFailure::Truncated {
                    received: self.bytes_transferred,
                    expected: self.total_bytes,
                };
                self.settle(TransferState::Failed(failure))
            }
            (TransferState::Started, TransferEvent::IoFailed { message }) => {
                self.settle(TransferState::Failed(TransferFailure::Io(message)))
            }
            (TransferState::Started, TransferEvent::CancelRequested) => {
                self.settle(TransferState::Cancelled)
            }

            // Terminal states and out-of-order events - stay put
            (state, _) => {
                self.state = state;
                (self, vec![])
            }
        }
    }

    fn settle(mut self, state: TransferState) -> (Self, Vec<TransferAction>) {
        self.state = state.clone();
        (self, vec![TransferAction::Settled(state)])
    }
}
