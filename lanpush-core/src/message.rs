//! Protocol message types and the polymorphic wire envelope.
//!
//! Every message starts with a stable `u32` discriminator (big-endian,
//! matching the frame length prefix) followed by a bincode body. Uses
//! proper enums with `TryFrom` — no panics on unknown values.
//!
//! ```text
//! frame payload = [kind: u32 BE] [body: bincode]
//! ```
//!
//! `Request`/`Response` envelopes carry a *nested* encoded message as
//! their payload, so the correlation layer never needs to understand
//! the inner application type.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PushError;

// ── MessageKind ──────────────────────────────────────────────────

/// Wire discriminator for every message the protocol understands.
///
/// - `0x01..0x02` — registration and application payloads
/// - `0x03..0x04` — request/response envelopes
/// - `0x05..0x06` — heartbeat markers (no body)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Device registration (`User`).
    User = 0x01,
    /// Application text message.
    Text = 0x02,
    /// Correlated request envelope.
    Request = 0x03,
    /// Correlated response envelope.
    Response = 0x04,
    /// Heartbeat probe.
    Ping = 0x05,
    /// Heartbeat reply.
    Pong = 0x06,
}

impl TryFrom<u32> for MessageKind {
    type Error = PushError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::User),
            0x02 => Ok(MessageKind::Text),
            0x03 => Ok(MessageKind::Request),
            0x04 => Ok(MessageKind::Response),
            0x05 => Ok(MessageKind::Ping),
            0x06 => Ok(MessageKind::Pong),
            other => Err(PushError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::User => write!(f, "User"),
            MessageKind::Text => write!(f, "Text"),
            MessageKind::Request => write!(f, "Request"),
            MessageKind::Response => write!(f, "Response"),
            MessageKind::Ping => write!(f, "Ping"),
            MessageKind::Pong => write!(f, "Pong"),
        }
    }
}

// ── User ─────────────────────────────────────────────────────────

/// Identity record a client sends as its first message on every
/// freshly opened channel. Immutable once formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub device_name: String,
}

impl User {
    /// Create a fresh identity with a random id.
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_name: device_name.into(),
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_name, self.id)
    }
}

// ── TextMessage ──────────────────────────────────────────────────

/// An application message routed from a sender's control channel to
/// the recipient's notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub sender: Uuid,
    pub recipient: Uuid,
    pub body: String,
    /// Millisecond precision so the wire encoding round-trips exactly.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl TextMessage {
    /// Create a message stamped with the current time, truncated to
    /// millisecond precision.
    pub fn new(sender: Uuid, recipient: Uuid, body: impl Into<String>) -> Self {
        let now = Utc::now();
        let timestamp = Utc
            .timestamp_millis_opt(now.timestamp_millis())
            .single()
            .unwrap_or(now);
        Self {
            sender,
            recipient,
            body: body.into(),
            timestamp,
        }
    }
}

// ── Request / Response ───────────────────────────────────────────

/// A correlated request envelope. The payload is a nested encoded
/// [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub payload: Vec<u8>,
}

impl Request {
    /// Wrap `inner` in a request envelope with correlation id `id`.
    pub fn wrapping(id: u64, inner: &Message) -> Result<Self, PushError> {
        Ok(Self {
            id,
            payload: inner.encode()?,
        })
    }

    /// Decode the nested message this request carries.
    pub fn message(&self) -> Result<Message, PushError> {
        Message::decode(&self.payload)
    }
}

/// A correlated response envelope. An empty payload with no error is
/// a plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub payload: Vec<u8>,
    pub error: Option<String>,
}

impl Response {
    /// A success acknowledgement with no payload.
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            payload: Vec::new(),
            error: None,
        }
    }

    /// A success response carrying a nested encoded message.
    pub fn with_payload(id: u64, inner: &Message) -> Result<Self, PushError> {
        Ok(Self {
            id,
            payload: inner.encode()?,
            error: None,
        })
    }

    /// A failure response with a human-readable reason.
    pub fn error(id: u64, detail: impl Into<String>) -> Self {
        Self {
            id,
            payload: Vec::new(),
            error: Some(detail.into()),
        }
    }

    /// Returns `true` when the peer reported success.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Decode the nested message this response carries, if any.
    pub fn message(&self) -> Result<Option<Message>, PushError> {
        if self.payload.is_empty() {
            return Ok(None);
        }
        Message::decode(&self.payload).map(Some)
    }
}

// ── Message ──────────────────────────────────────────────────────

/// The tagged union of everything that can travel inside one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    User(User),
    Text(TextMessage),
    Request(Request),
    Response(Response),
    Ping,
    Pong,
}

/// Size of the discriminator word that precedes every body.
const KIND_SIZE: usize = 4;

impl Message {
    /// The wire discriminator for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::User(_) => MessageKind::User,
            Message::Text(_) => MessageKind::Text,
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
            Message::Ping => MessageKind::Ping,
            Message::Pong => MessageKind::Pong,
        }
    }

    /// Serialize to a frame payload: discriminator word + bincode body.
    pub fn encode(&self) -> Result<Vec<u8>, PushError> {
        let mut buf = (self.kind() as u32).to_be_bytes().to_vec();
        match self {
            Message::User(user) => buf.extend(bincode::serialize(user)?),
            Message::Text(text) => buf.extend(bincode::serialize(text)?),
            Message::Request(request) => buf.extend(bincode::serialize(request)?),
            Message::Response(response) => buf.extend(bincode::serialize(response)?),
            // Heartbeat markers carry no body.
            Message::Ping | Message::Pong => {}
        }
        Ok(buf)
    }

    /// Deserialize from a frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, PushError> {
        if bytes.len() < KIND_SIZE {
            return Err(PushError::Decode(format!(
                "payload shorter than discriminator: {} bytes",
                bytes.len()
            )));
        }
        let mut word = [0u8; KIND_SIZE];
        word.copy_from_slice(&bytes[..KIND_SIZE]);
        let kind = MessageKind::try_from(u32::from_be_bytes(word))?;
        let body = &bytes[KIND_SIZE..];

        match kind {
            MessageKind::User => Ok(Message::User(bincode::deserialize(body)?)),
            MessageKind::Text => Ok(Message::Text(bincode::deserialize(body)?)),
            MessageKind::Request => Ok(Message::Request(bincode::deserialize(body)?)),
            MessageKind::Response => Ok(Message::Response(bincode::deserialize(body)?)),
            MessageKind::Ping | MessageKind::Pong => {
                if !body.is_empty() {
                    return Err(PushError::ProtocolViolation(
                        "heartbeat markers carry no body",
                    ));
                }
                Ok(match kind {
                    MessageKind::Ping => Message::Ping,
                    _ => Message::Pong,
                })
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        let kinds = [
            MessageKind::User,
            MessageKind::Text,
            MessageKind::Request,
            MessageKind::Response,
            MessageKind::Ping,
            MessageKind::Pong,
        ];
        for kind in kinds {
            assert_eq!(MessageKind::try_from(kind as u32).unwrap(), kind);
        }
    }

    #[test]
    fn kind_invalid() {
        assert!(matches!(
            MessageKind::try_from(0xDEAD),
            Err(PushError::UnknownMessageType(0xDEAD))
        ));
    }

    #[test]
    fn user_roundtrip() {
        let m = Message::User(User::new("Living Room"));
        let decoded = Message::decode(&m.encode().unwrap()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn text_roundtrip() {
        let m = Message::Text(TextMessage::new(Uuid::new_v4(), Uuid::new_v4(), "hi"));
        let decoded = Message::decode(&m.encode().unwrap()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn request_response_roundtrip() {
        let inner = Message::Text(TextMessage::new(Uuid::new_v4(), Uuid::new_v4(), "hello"));
        let m = Message::Request(Request::wrapping(7, &inner).unwrap());
        let decoded = Message::decode(&m.encode().unwrap()).unwrap();
        assert_eq!(decoded, m);
        if let Message::Request(request) = decoded {
            assert_eq!(request.message().unwrap(), inner);
        }

        let m = Message::Response(Response::ok(7));
        assert_eq!(Message::decode(&m.encode().unwrap()).unwrap(), m);

        let m = Message::Response(Response::error(7, "no such user"));
        let decoded = Message::decode(&m.encode().unwrap()).unwrap();
        assert_eq!(decoded, m);
        if let Message::Response(response) = decoded {
            assert!(!response.is_ok());
        }
    }

    #[test]
    fn heartbeat_roundtrip() {
        for m in [Message::Ping, Message::Pong] {
            let bytes = m.encode().unwrap();
            assert_eq!(bytes.len(), 4); // discriminator only
            assert_eq!(Message::decode(&bytes).unwrap(), m);
        }
    }

    #[test]
    fn heartbeat_with_body_rejected() {
        let mut bytes = Message::Ping.encode().unwrap();
        bytes.push(0xAB);
        assert!(matches!(
            Message::decode(&bytes),
            Err(PushError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(matches!(
            Message::decode(&[0x00, 0x01]),
            Err(PushError::Decode(_))
        ));
    }

    #[test]
    fn malformed_body_rejected() {
        let mut bytes = (MessageKind::User as u32).to_be_bytes().to_vec();
        bytes.extend([0xFF, 0xFF]); // not a valid bincode User
        assert!(matches!(
            Message::decode(&bytes),
            Err(PushError::Decode(_))
        ));
    }

    #[test]
    fn response_nested_payload() {
        let inner = Message::User(User::new("Kitchen"));
        let response = Response::with_payload(3, &inner).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.message().unwrap(), Some(inner));
        assert_eq!(Response::ok(3).message().unwrap(), None);
    }
}
