//! # pairlink-types
//!
//! Wire format types for the pairlink device link protocol.
//!
//! This crate provides the foundational types used across all pairlink crates:
//! - [`DeviceId`], [`TransferId`] - Identity types
//! - [`Packet`] - The JSON envelope exchanged over the control connection
//! - [`Body`] - Typed packet bodies (notifications, share requests, ...)
//! - [`PacketError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod body;
mod error;
mod ids;
mod packet;

pub use body::{
    Body, NotificationBody, NotificationReply, NotificationRequest, ShareContent, ShareRequest,
};
pub use error::PacketError;
pub use ids::{DeviceId, TransferId};
pub use packet::{Packet, PacketType, Payload, PayloadTransferInfo, PROTOCOL_NAMESPACE};
