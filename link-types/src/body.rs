//! Typed packet bodies.
//!
//! Each known packet type has its own body struct. Fields the protocol does
//! not define are kept in `extra` so a packet can be forwarded or re-encoded
//! without losing data from newer peers, but nothing here interprets them.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{PacketError, PacketType};

/// Body of a packet, one variant per known packet type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// `kdeconnect.notification`
    Notification(NotificationBody),
    /// `kdeconnect.notification.request`
    NotificationRequest(NotificationRequest),
    /// `kdeconnect.notification.reply`
    NotificationReply(NotificationReply),
    /// `kdeconnect.share.request`
    ShareRequest(ShareRequest),
    /// Any type outside the known vocabulary, kept verbatim.
    Unknown {
        /// Wire type string as received.
        packet_type: String,
        /// Raw body fields.
        fields: Map<String, Value>,
    },
}

impl Body {
    /// The known packet type of this body, if any.
    pub fn packet_type(&self) -> Option<PacketType> {
        match self {
            Body::Notification(_) => Some(PacketType::Notification),
            Body::NotificationRequest(_) => Some(PacketType::NotificationRequest),
            Body::NotificationReply(_) => Some(PacketType::NotificationReply),
            Body::ShareRequest(_) => Some(PacketType::ShareRequest),
            Body::Unknown { .. } => None,
        }
    }

    /// The type string written on the wire.
    pub fn wire_type(&self) -> &str {
        match self {
            Body::Unknown { packet_type, .. } => packet_type,
            known => known
                .packet_type()
                .map(|t| t.as_str())
                .unwrap_or_default(),
        }
    }

    /// Decode a raw body for the given wire type.
    pub(crate) fn decode(wire_type: &str, value: Value) -> Result<Self, PacketError> {
        let value = match value {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            _ => return Err(PacketError::BodyNotObject),
        };

        match PacketType::from_wire(wire_type) {
            Some(PacketType::Notification) => {
                let body: NotificationBody = serde_json::from_value(value)?;
                if body.id.is_empty() {
                    return Err(PacketError::MissingField {
                        packet_type: PacketType::Notification.as_str(),
                        field: "id",
                    });
                }
                Ok(Body::Notification(body))
            }
            Some(PacketType::NotificationRequest) => {
                Ok(Body::NotificationRequest(serde_json::from_value(value)?))
            }
            Some(PacketType::NotificationReply) => {
                Ok(Body::NotificationReply(serde_json::from_value(value)?))
            }
            Some(PacketType::ShareRequest) => {
                let raw: RawShareRequest = serde_json::from_value(value)?;
                Ok(Body::ShareRequest(ShareRequest::try_from(raw)?))
            }
            None => {
                let fields = match value {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Ok(Body::Unknown {
                    packet_type: wire_type.to_string(),
                    fields,
                })
            }
        }
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Body::Notification(body) => body.serialize(serializer),
            Body::NotificationRequest(body) => body.serialize(serializer),
            Body::NotificationReply(body) => body.serialize(serializer),
            Body::ShareRequest(body) => body.serialize(serializer),
            Body::Unknown { fields, .. } => fields.serialize(serializer),
        }
    }
}

impl From<NotificationBody> for Body {
    fn from(body: NotificationBody) -> Self {
        Body::Notification(body)
    }
}

impl From<NotificationRequest> for Body {
    fn from(body: NotificationRequest) -> Self {
        Body::NotificationRequest(body)
    }
}

impl From<NotificationReply> for Body {
    fn from(body: NotificationReply) -> Self {
        Body::NotificationReply(body)
    }
}

impl From<ShareRequest> for Body {
    fn from(body: ShareRequest) -> Self {
        Body::ShareRequest(body)
    }
}

/// A notification posted (or cancelled) on the sending device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBody {
    /// Remote-assigned notification identifier.
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    /// Name of the application that posted the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Short display text, used to correlate duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    /// Notification title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Notification text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Posting time on the remote. Peers send either a string or a number.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<String>,
    /// The notification was dismissed on the remote.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_cancel: bool,
    /// Whether the user may dismiss it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_clearable: Option<bool>,
    /// The remote expects an answer to this notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_answer: Option<bool>,
    /// Present without sound or popup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
    /// Checksum of the attached icon payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    /// Identifier to quote in a `notification.reply`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_reply_id: Option<String>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationBody {
    /// A cancellation for the notification with the given remote id.
    pub fn cancel(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_cancel: true,
            ..Self::default()
        }
    }
}

/// Request sent to the peer about its notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    /// Ask the peer to resend every active notification.
    #[serde(default, skip_serializing_if = "is_false")]
    pub request: bool,
    /// Ask the peer to dismiss the notification with this remote id.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub cancel: Option<String>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationRequest {
    /// Ask the peer to resend its current notification set.
    pub fn resend_all() -> Self {
        Self {
            request: true,
            ..Self::default()
        }
    }

    /// Ask the peer to dismiss one notification.
    pub fn cancel(remote_id: impl Into<String>) -> Self {
        Self {
            cancel: Some(remote_id.into()),
            ..Self::default()
        }
    }
}

/// Reply to a notification that carried a `requestReplyId`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReply {
    /// The `requestReplyId` of the notification being answered.
    pub reply_id: String,
    /// Reply text.
    pub message_body: String,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a share request carries. The wire keys are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareContent {
    /// A file, streamed as the packet payload.
    File {
        /// Base name of the file on the sender.
        filename: String,
    },
    /// Plain text.
    Text {
        /// The shared text.
        text: String,
    },
    /// A URL to open.
    Url {
        /// The shared URL.
        url: String,
    },
}

/// Body of a `kdeconnect.share.request` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRequest {
    /// The shared content.
    pub content: ShareContent,
    /// Fields this crate does not interpret.
    pub extra: Map<String, Value>,
}

impl ShareRequest {
    /// Share a file by name; the bytes travel as the payload.
    pub fn file(filename: impl Into<String>) -> Self {
        Self::from(ShareContent::File {
            filename: filename.into(),
        })
    }

    /// Share a piece of text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from(ShareContent::Text { text: text.into() })
    }

    /// Share a URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::from(ShareContent::Url { url: url.into() })
    }
}

impl From<ShareContent> for ShareRequest {
    fn from(content: ShareContent) -> Self {
        Self {
            content,
            extra: Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawShareRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawShareRequest> for ShareRequest {
    type Error = PacketError;

    // Senders are expected to set exactly one key; when several appear the
    // file wins, then text, then url.
    fn try_from(raw: RawShareRequest) -> Result<Self, Self::Error> {
        let content = if let Some(filename) = raw.filename {
            ShareContent::File { filename }
        } else if let Some(text) = raw.text {
            ShareContent::Text { text }
        } else if let Some(url) = raw.url {
            ShareContent::Url { url }
        } else {
            return Err(PacketError::MissingField {
                packet_type: PacketType::ShareRequest.as_str(),
                field: "filename",
            });
        };
        Ok(Self {
            content,
            extra: raw.extra,
        })
    }
}

impl Serialize for ShareRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut raw = RawShareRequest {
            filename: None,
            text: None,
            url: None,
            extra: self.extra.clone(),
        };
        match &self.content {
            ShareContent::File { filename } => raw.filename = Some(filename.clone()),
            ShareContent::Text { text } => raw.text = Some(text.clone()),
            ShareContent::Url { url } => raw.url = Some(url.clone()),
        }
        raw.serialize(serializer)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or a number, got {}",
            other
        ))),
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or_number(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_time_accepts_numbers_and_strings() {
        let numeric: NotificationBody =
            serde_json::from_value(json!({"id": "1", "time": 1000})).unwrap();
        let text: NotificationBody =
            serde_json::from_value(json!({"id": "1", "time": "1000"})).unwrap();
        assert_eq!(numeric.time.as_deref(), Some("1000"));
        assert_eq!(numeric.time, text.time);
    }

    #[test]
    fn notification_id_accepts_numbers() {
        let body: NotificationBody =
            serde_json::from_value(json!({"id": 42, "isCancel": true})).unwrap();
        assert_eq!(body.id, "42");
        assert!(body.is_cancel);
    }

    #[test]
    fn notification_keeps_unknown_fields() {
        let body: NotificationBody = serde_json::from_value(json!({
            "id": "7",
            "appName": "Mail",
            "onlyOnce": true,
        }))
        .unwrap();
        assert_eq!(body.app_name.as_deref(), Some("Mail"));
        assert_eq!(body.extra.get("onlyOnce"), Some(&json!(true)));

        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["onlyOnce"], json!(true));
        assert_eq!(encoded["appName"], json!("Mail"));
    }

    #[test]
    fn notification_omits_unset_fields() {
        let encoded = serde_json::to_value(NotificationBody::cancel("42")).unwrap();
        assert_eq!(encoded, json!({"id": "42", "isCancel": true}));
    }

    #[test]
    fn notification_without_id_is_rejected() {
        let err = Body::decode("kdeconnect.notification", json!({"ticker": "hi"})).unwrap_err();
        assert!(matches!(err, PacketError::MissingField { field: "id", .. }));
    }

    #[test]
    fn request_bodies() {
        assert_eq!(
            serde_json::to_value(NotificationRequest::resend_all()).unwrap(),
            json!({"request": true})
        );
        assert_eq!(
            serde_json::to_value(NotificationRequest::cancel("0|com.mail|3")).unwrap(),
            json!({"cancel": "0|com.mail|3"})
        );
    }

    #[test]
    fn share_request_selects_single_key() {
        let body = Body::decode("kdeconnect.share.request", json!({"url": "https://x.org"}))
            .unwrap();
        match body {
            Body::ShareRequest(share) => {
                assert_eq!(
                    share.content,
                    ShareContent::Url {
                        url: "https://x.org".into()
                    }
                )
            }
            other => panic!("Expected share request, got {:?}", other),
        }
    }

    #[test]
    fn share_request_prefers_filename() {
        let body = Body::decode(
            "kdeconnect.share.request",
            json!({"filename": "a.pdf", "text": "ignored"}),
        )
        .unwrap();
        assert!(matches!(
            body,
            Body::ShareRequest(ShareRequest {
                content: ShareContent::File { .. },
                ..
            })
        ));
    }

    #[test]
    fn share_request_without_content_is_rejected() {
        let err = Body::decode("kdeconnect.share.request", json!({})).unwrap_err();
        assert!(matches!(err, PacketError::MissingField { .. }));
    }

    #[test]
    fn share_request_serializes_one_key() {
        let encoded = serde_json::to_value(ShareRequest::text("hello")).unwrap();
        assert_eq!(encoded, json!({"text": "hello"}));
    }

    #[test]
    fn unknown_type_preserves_body() {
        let body = Body::decode("kdeconnect.ping", json!({"message": "hi"})).unwrap();
        assert_eq!(body.wire_type(), "kdeconnect.ping");
        assert!(body.packet_type().is_none());
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"message": "hi"}));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let err = Body::decode("kdeconnect.notification", json!([1, 2])).unwrap_err();
        assert!(matches!(err, PacketError::BodyNotObject));
    }
}
