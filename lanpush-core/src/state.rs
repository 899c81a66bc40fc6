//! Session lifecycle state machine.
//!
//! Provides a `SessionState` enum modeling the life of one transport
//! connection, with validated transitions that return `Result`
//! instead of panicking.

use std::time::Instant;

use crate::error::PushError;

// ── SessionState ─────────────────────────────────────────────────

/// The current phase of a session's underlying connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected ──► Disconnected
///                        │              │
///                        ▼              ▼
///                      Failed ◄─────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active connection. Initial / terminal state.
    #[default]
    Disconnected,

    /// Transport handed over but the session machinery is still
    /// starting up.
    Connecting,

    /// Reader and writer are live; ready for protocol traffic.
    Connected {
        /// When the session entered the `Connected` state.
        since: Instant,
    },

    /// The transport reported an error; terminal until torn down.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl SessionState {
    /// Returns `true` when the session is ready for protocol traffic.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` when the session is in its idle/terminal state.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` after a transport failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// How long the session has been in the `Connected` state.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), PushError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(PushError::ProtocolViolation(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), PushError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(PushError::ProtocolViolation(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Connecting`, `Connected`.
    pub fn mark_failed(&mut self) -> Result<(), PushError> {
        match self {
            Self::Connecting | Self::Connected { .. } => {
                *self = Self::Failed;
                Ok(())
            }
            _ => Err(PushError::ProtocolViolation(
                "cannot fail: not in a live state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Safe to call from any concurrent teardown path; idempotent.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
