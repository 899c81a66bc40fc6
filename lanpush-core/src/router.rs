//! `Router` — single source of truth mapping registered users to
//! their live sessions.
//!
//! The table is keyed by `(user id, channel type)`; at most one live
//! session ever occupies a key. A new registration for an occupied
//! key disconnects the prior session first (last-registration-wins),
//! and every entry is removed automatically when its session closes.
//!
//! Routers are explicitly constructed, dependency-injected instances —
//! tests spin up as many independent routers as they need.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channel::ChannelType;
use crate::error::PushError;
use crate::message::{Message, User};
use crate::session::NetworkSession;

// ── Registration ─────────────────────────────────────────────────

/// Event emitted for every successful registration, carrying the
/// session's inbound receiver so a consumer can attach its handling
/// loop without missing messages that arrived during hand-off.
pub struct Registration {
    pub user: User,
    pub channel_type: ChannelType,
    pub session: Arc<NetworkSession>,
    pub inbox: broadcast::Receiver<Message>,
}

// ── Router ───────────────────────────────────────────────────────

type RouteKey = (Uuid, ChannelType);

/// Maps `(user id, channel type)` to the one live session for that
/// key and dispatches outbound messages to it.
pub struct Router {
    table: Mutex<HashMap<RouteKey, Arc<NetworkSession>>>,
    events: mpsc::UnboundedSender<Registration>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Registration>>>,
}

impl Router {
    pub fn new() -> Arc<Self> {
        let (events, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            table: Mutex::new(HashMap::new()),
            events,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Take the registration event stream. Yields `Some` exactly once.
    pub fn take_registrations(&self) -> Option<mpsc::UnboundedReceiver<Registration>> {
        self.events_rx.lock().take()
    }

    /// Store `session` under `(user.id, channel_type)`. An existing
    /// occupant is disconnected first; a watcher removes the entry
    /// once the new session closes.
    pub async fn register(
        self: &Arc<Self>,
        user: User,
        session: Arc<NetworkSession>,
        channel_type: ChannelType,
        inbox: broadcast::Receiver<Message>,
    ) {
        let key = (user.id, channel_type);
        let prior = self.table.lock().insert(key, session.clone());

        if let Some(prior) = prior {
            debug!(user = %user, channel = %channel_type, replaced = prior.id(),
                "replacing existing session");
            prior.disconnect().await;
        }

        info!(user = %user, channel = %channel_type, session = session.id(), "registered");

        // Auto-remove on close, guarded by session id so a replaced
        // session cannot evict its successor.
        {
            let router = Arc::downgrade(self);
            let session_id = session.id();
            let closed = session.closed();
            tokio::spawn(async move {
                closed.await;
                if let Some(router) = router.upgrade() {
                    let mut table = router.table.lock();
                    if table.get(&key).map(|s| s.id()) == Some(session_id) {
                        table.remove(&key);
                        debug!(user = %key.0, channel = %key.1, "removed closed session");
                    }
                }
            });
        }

        let _ = self.events.send(Registration {
            user,
            channel_type,
            session,
            inbox,
        });
    }

    /// Forward `message` to `to`'s session on the `via` channel.
    pub async fn route(
        &self,
        message: Message,
        to: Uuid,
        via: ChannelType,
    ) -> Result<(), PushError> {
        let session = self.table.lock().get(&(to, via)).cloned();
        match session {
            Some(session) => session.send(message).await,
            None => Err(PushError::UserNotReachable {
                user: to,
                channel: via,
            }),
        }
    }

    /// Explicit removal, used on heartbeat-detected failure. Returns
    /// `true` if an entry was removed.
    pub async fn unregister(&self, user: Uuid, channel_type: ChannelType) -> bool {
        let removed = self.table.lock().remove(&(user, channel_type));
        match removed {
            Some(session) => {
                info!(user = %user, channel = %channel_type, "unregistered");
                session.disconnect().await;
                true
            }
            None => false,
        }
    }

    /// Whether a live session occupies `(user, channel_type)`.
    pub fn is_registered(&self, user: Uuid, channel_type: ChannelType) -> bool {
        self.table.lock().contains_key(&(user, channel_type))
    }

    /// Snapshot of every registered session on one channel type.
    pub fn sessions(&self, channel_type: ChannelType) -> Vec<(Uuid, Arc<NetworkSession>)> {
        self.table
            .lock()
            .iter()
            .filter(|((_, ct), _)| *ct == channel_type)
            .map(|((user, _), session)| (*user, session.clone()))
            .collect()
    }

    /// Total number of registered sessions across both channel types.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
