//! Domain-specific error types for the lanpush protocol.
//!
//! All fallible operations return `Result<T, PushError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::channel::ChannelType;

/// The canonical error type for the lanpush protocol.
#[derive(Debug, Error)]
pub enum PushError {
    // ── Framing Errors ───────────────────────────────────────────
    /// A length prefix announced a frame beyond the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Codec Errors ─────────────────────────────────────────────
    /// A message discriminator did not map to any known kind.
    #[error("unknown message discriminant: {0:#x}")]
    UnknownMessageType(u32),

    /// A message body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Session Errors ───────────────────────────────────────────
    /// An operation required a connected session.
    #[error("session is not connected")]
    NotConnected,

    /// A correlated request received no response before its deadline.
    #[error("request {id} timed out after {timeout:?}")]
    RequestTimedOut { id: u64, timeout: Duration },

    /// The underlying connection closed while an operation was in flight.
    #[error("connection lost")]
    ConnectionLost,

    /// The session was cancelled while an operation was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Routing Errors ───────────────────────────────────────────
    /// The recipient has no live session on the requested channel.
    #[error("user {user} not reachable on {channel} channel")]
    UserNotReachable { user: Uuid, channel: ChannelType },

    /// The remote peer answered a request with an error.
    #[error("request rejected by peer: {0}")]
    Rejected(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for PushError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        PushError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for PushError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        PushError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PushError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = PushError::UnknownMessageType(0xFF);
        assert!(e.to_string().contains("0xff"));
    }

    #[test]
    fn user_not_reachable_names_channel() {
        let e = PushError::UserNotReachable {
            user: Uuid::nil(),
            channel: ChannelType::Notification,
        };
        assert!(e.to_string().contains("notification"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: PushError = io_err.into();
        assert!(matches!(e, PushError::Io(_)));
    }
}
