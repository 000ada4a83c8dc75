//! The packet envelope exchanged over the control connection.
//!
//! On the wire a packet is one JSON object per line:
//!
//! ```text
//! {"id":1700000000000,"type":"kdeconnect.share.request","body":{"filename":"a.pdf"},
//!  "payloadSize":1024,"payloadTransferInfo":{"port":1739}}
//! ```
//!
//! A [`Packet`] is immutable once built. Handlers that need to answer build a
//! new packet instead of editing the one they received.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    Body, NotificationBody, NotificationReply, NotificationRequest, PacketError, ShareRequest,
};

/// Namespace prefix carried by every packet type on the wire.
pub const PROTOCOL_NAMESPACE: &str = "kdeconnect.";

/// Known packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// A notification posted or cancelled on the sender.
    Notification,
    /// Resend-all or dismiss request for notifications.
    NotificationRequest,
    /// Reply to a repliable notification.
    NotificationReply,
    /// Share a file, text or URL.
    ShareRequest,
}

impl PacketType {
    /// Every known packet type.
    pub const ALL: [PacketType; 4] = [
        PacketType::Notification,
        PacketType::NotificationRequest,
        PacketType::NotificationReply,
        PacketType::ShareRequest,
    ];

    /// The full wire string, including the namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Notification => "kdeconnect.notification",
            PacketType::NotificationRequest => "kdeconnect.notification.request",
            PacketType::NotificationReply => "kdeconnect.notification.reply",
            PacketType::ShareRequest => "kdeconnect.share.request",
        }
    }

    /// Parse a wire type string. The namespace prefix is optional.
    pub fn from_wire(s: &str) -> Option<Self> {
        let short = s.strip_prefix(PROTOCOL_NAMESPACE).unwrap_or(s);
        match short {
            "notification" => Some(PacketType::Notification),
            "notification.request" => Some(PacketType::NotificationRequest),
            "notification.reply" => Some(PacketType::NotificationReply),
            "share.request" => Some(PacketType::ShareRequest),
            _ => None,
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection hint for fetching a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadTransferInfo {
    /// TCP port the sender is listening on.
    pub port: u16,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PayloadTransferInfo {
    /// Transfer info pointing at a listening port.
    pub fn port(port: u16) -> Self {
        Self {
            port,
            extra: Map::new(),
        }
    }
}

/// Out-of-band payload attached to a packet.
///
/// Size and transfer info always travel together.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Number of payload bytes.
    pub size: u64,
    /// Where to fetch them.
    pub transfer_info: PayloadTransferInfo,
}

impl Payload {
    /// A payload of `size` bytes served on `port`.
    pub fn new(size: u64, port: u16) -> Self {
        Self {
            size,
            transfer_info: PayloadTransferInfo::port(port),
        }
    }
}

/// A control packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawPacket")]
pub struct Packet {
    id: i64,
    body: Body,
    payload: Option<Payload>,
}

impl Packet {
    /// Build a packet stamped with the current time.
    pub fn new(body: impl Into<Body>) -> Self {
        let id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self {
            id,
            body: body.into(),
            payload: None,
        }
    }

    /// Replace the informational id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Attach a payload descriptor.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Informational id (sender timestamp).
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The typed body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The payload descriptor, if any.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Known packet type, `None` for types outside the vocabulary.
    pub fn packet_type(&self) -> Option<PacketType> {
        self.body.packet_type()
    }

    /// The type string as written on the wire.
    pub fn wire_type(&self) -> &str {
        self.body.wire_type()
    }

    /// The body as a notification, if it is one.
    pub fn as_notification(&self) -> Option<&NotificationBody> {
        match &self.body {
            Body::Notification(body) => Some(body),
            _ => None,
        }
    }

    /// The body as a notification request, if it is one.
    pub fn as_notification_request(&self) -> Option<&NotificationRequest> {
        match &self.body {
            Body::NotificationRequest(body) => Some(body),
            _ => None,
        }
    }

    /// The body as a notification reply, if it is one.
    pub fn as_notification_reply(&self) -> Option<&NotificationReply> {
        match &self.body {
            Body::NotificationReply(body) => Some(body),
            _ => None,
        }
    }

    /// The body as a share request, if it is one.
    pub fn as_share_request(&self) -> Option<&ShareRequest> {
        match &self.body {
            Body::ShareRequest(body) => Some(body),
            _ => None,
        }
    }

    /// Encode as one newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, PacketError> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decode from a JSON line. Surrounding whitespace is ignored.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PacketError> {
        let raw: RawPacket = serde_json::from_slice(bytes)?;
        Self::try_from(raw)
    }
}

impl Serialize for Packet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.payload.is_some() { 5 } else { 3 };
        let mut state = serializer.serialize_struct("Packet", len)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", self.body.wire_type())?;
        state.serialize_field("body", &self.body)?;
        if let Some(payload) = &self.payload {
            state.serialize_field("payloadSize", &payload.size)?;
            state.serialize_field("payloadTransferInfo", &payload.transfer_info)?;
        }
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPacket {
    #[serde(default)]
    id: Value,
    #[serde(rename = "type")]
    packet_type: String,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    payload_size: Option<i64>,
    #[serde(default)]
    payload_transfer_info: Option<Value>,
}

impl TryFrom<RawPacket> for Packet {
    type Error = PacketError;

    fn try_from(raw: RawPacket) -> Result<Self, Self::Error> {
        // The id is informational; peers disagree on number vs string.
        let id = match &raw.id {
            Value::Number(n) => n.as_i64().unwrap_or_default(),
            Value::String(s) => s.parse().unwrap_or_default(),
            _ => 0,
        };

        let payload = match (raw.payload_size, raw.payload_transfer_info) {
            (None, None) => None,
            (Some(size), Some(info)) => {
                let size = u64::try_from(size).map_err(|_| {
                    PacketError::InvalidPayloadInfo(format!("negative payload size {}", size))
                })?;
                let transfer_info: PayloadTransferInfo = serde_json::from_value(info)
                    .map_err(|e| PacketError::InvalidPayloadInfo(e.to_string()))?;
                Some(Payload {
                    size,
                    transfer_info,
                })
            }
            _ => return Err(PacketError::IncompletePayload),
        };

        let body = Body::decode(&raw.packet_type, raw.body)?;
        Ok(Self { id, body, payload })
    }
}
