//! `Channel` — a listener bound to one port and one channel type.
//!
//! Accepts inbound connections, wraps each in a [`NetworkSession`]
//! held as a pending session, and performs the registration handshake:
//! the first message on a fresh connection must be a `User`, after
//! which the session is handed to the [`Router`]. Anything else is a
//! protocol violation and drops the connection.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PushError;
use crate::message::Message;
use crate::router::Router;
use crate::session::{NetworkSession, SessionConfig};

// ── ChannelType ──────────────────────────────────────────────────

/// The two logical roles a connection can serve. A user has at most
/// one active session per channel type at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Registration and routing commands.
    Control,
    /// Push-style delivery and heartbeat.
    Notification,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Control => write!(f, "control"),
            ChannelType::Notification => write!(f, "notification"),
        }
    }
}

// ── ChannelConfig ────────────────────────────────────────────────

/// Tuning knobs for a listener and the sessions it creates.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Configuration applied to every accepted session.
    pub session: SessionConfig,

    /// How long a pending session may sit unregistered before it is
    /// dropped.
    pub registration_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            registration_timeout: Duration::from_secs(10),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// Pending (unregistered) sessions keyed by session id. Owned
/// exclusively by the channel; never shared.
type PendingSet = Arc<Mutex<HashMap<u64, Arc<NetworkSession>>>>;

/// A listener bound to a port for one channel type.
pub struct Channel {
    channel_type: ChannelType,
    port: u16,
    router: Arc<Router>,
    config: ChannelConfig,
    pending: PendingSet,
    shutdown: CancellationToken,
}

impl Channel {
    pub fn new(
        port: u16,
        channel_type: ChannelType,
        router: Arc<Router>,
        config: ChannelConfig,
    ) -> Self {
        Self {
            channel_type,
            port,
            router,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// The channel type this listener serves.
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Number of accepted connections still awaiting registration.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Bind the listener and begin accepting connections. Returns the
    /// bound address (useful with port 0 in tests).
    pub async fn start(&self) -> Result<SocketAddr, PushError> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let addr = listener.local_addr()?;
        info!(channel = %self.channel_type, %addr, "listening");

        let channel_type = self.channel_type;
        let router = self.router.clone();
        let config = self.config.clone();
        let pending = self.pending.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(channel = %channel_type, %peer, "received new connection");
                            setup(stream, channel_type, router.clone(), config.clone(), pending.clone());
                        }
                        Err(e) => {
                            warn!(channel = %channel_type, error = %e, "accept error");
                        }
                    },
                }
            }
            debug!(channel = %channel_type, "listener stopped");
        });

        Ok(addr)
    }

    /// Cancel the listener. Already-registered sessions stay alive;
    /// they belong to the router now.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Wrap an accepted connection and run the registration handshake.
fn setup(
    stream: TcpStream,
    channel_type: ChannelType,
    router: Arc<Router>,
    config: ChannelConfig,
    pending: PendingSet,
) {
    let (session, mut inbox) = NetworkSession::connect(stream, config.session);
    pending.lock().insert(session.id(), session.clone());

    tokio::spawn(async move {
        let user = tokio::select! {
            first = first_registration(&mut inbox) => first,
            _ = tokio::time::sleep(config.registration_timeout) => {
                debug!(channel = %channel_type, session = session.id(), "registration timed out");
                None
            }
        };

        pending.lock().remove(&session.id());

        match user {
            Some(user) => {
                info!(channel = %channel_type, user = %user, "received registration");
                router.register(user, session, channel_type, inbox).await;
            }
            None => session.disconnect().await,
        }
    });
}

/// Await the first message on a fresh connection; only a `User`
/// registration is acceptable.
async fn first_registration(inbox: &mut broadcast::Receiver<Message>) -> Option<crate::message::User> {
    match inbox.recv().await {
        Ok(Message::User(user)) => Some(user),
        Ok(other) => {
            warn!(kind = %other.kind(), "protocol violation: first message must be a registration");
            None
        }
        Err(_) => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────
