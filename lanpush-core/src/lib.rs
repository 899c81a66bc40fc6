//! # lanpush-core
//!
//! Core protocol library for the lanpush local-network messaging
//! stack.
//!
//! This crate contains:
//! - **Framing**: `LengthPrefixedFramer` — 4-byte big-endian length
//!   prefix codec via `tokio_util`
//! - **Messages**: `Message`, `MessageKind`, `User`, `TextMessage`,
//!   `Request`/`Response` envelopes, heartbeat markers
//! - **Session**: `NetworkSession` — one live connection with
//!   request/response correlation and an unsolicited-message stream
//! - **Channel**: listener + registration handshake per channel type
//! - **Router**: `(user, channel type) → session` table and dispatch
//! - **Heartbeat**: `HeartbeatCoordinator` for liveness probing
//! - **Error**: `PushError` — typed, `thiserror`-based error hierarchy
//!
//! TLS and the OS socket layer are external collaborators: the session
//! is generic over any `AsyncRead + AsyncWrite` transport.

pub mod channel;
pub mod codec;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod router;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channel::{Channel, ChannelConfig, ChannelType};
pub use codec::{LENGTH_PREFIX_SIZE, LengthPrefixedFramer, MAX_FRAME_SIZE, MessageCodec};
pub use error::PushError;
pub use heartbeat::{HeartbeatConfig, HeartbeatCoordinator};
pub use message::{Message, MessageKind, Request, Response, TextMessage, User};
pub use router::{Registration, Router};
pub use session::{NetworkSession, SessionConfig};
pub use state::SessionState;
