//! # pairlink-core
//!
//! Pure logic for pairlink (no I/O, instant tests).
//!
//! This crate holds the state machines and decision rules of the device link
//! without any network or disk I/O:
//! - [`TransferDescriptor`] - payload transfer state machine
//! - [`NotificationTracker`] - duplicate and lifecycle tracking of notifications
//! - [`Suppression`], [`DoNotDisturb`] - what gets tracked and what gets shown
//! - [`present`] - formatting for the notification presenter
//! - [`ChecksumAlgorithm`] - payload digests
//!
//! The actual I/O (sockets, files, the presenter) is performed by
//! `pairlink-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod policy;
pub mod present;
pub mod tracker;
pub mod transfer;

pub use checksum::{digests_match, ChecksumAlgorithm, ChecksumHasher, UnknownAlgorithm};
pub use policy::{DoNotDisturb, Suppression, GROUP_SUMMARY_MARKER, SMS_THREAD_MARKER};
pub use present::{
    present, themed_name, Contact, Icon, NotificationKind, Origin, Presentation, Priority,
    MISSED_CALL_TITLE,
};
pub use tracker::{Found, MatchKind, NotificationRecord, NotificationTracker, TrackerAction};
pub use transfer::{
    TransferAction, TransferDescriptor, TransferEvent, TransferFailure, TransferState,
};
