//! Error types for pairlink packets.

use thiserror::Error;

/// Errors raised while decoding or encoding a [`Packet`](crate::Packet).
///
/// Every variant is scoped to a single packet: the caller drops the packet,
/// logs the diagnostic, and keeps the device session running.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The packet was not valid JSON or did not match the packet shape.
    #[error("malformed packet: {0}")]
    Json(#[from] serde_json::Error),

    /// A body field required by the packet type is missing.
    #[error("{packet_type} body is missing required field '{field}'")]
    MissingField {
        /// Wire type of the packet.
        packet_type: &'static str,
        /// Name of the missing body field.
        field: &'static str,
    },

    /// Only one half of the payload descriptor was present.
    #[error("payloadSize and payloadTransferInfo must be sent together")]
    IncompletePayload,

    /// The payload descriptor did not carry a usable connection hint.
    #[error("invalid payload transfer info: {0}")]
    InvalidPayloadInfo(String),

    /// The body was not a JSON object.
    #[error("packet body must be an object")]
    BodyNotObject,
}
