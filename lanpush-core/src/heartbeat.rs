//! `HeartbeatCoordinator` — liveness probing for notification
//! sessions.
//!
//! Transports do not always report silently dead connections (an idle
//! NAT-dropped link looks healthy until the next write). On a fixed
//! interval the coordinator sends a `Ping` to every registered
//! notification session and watches its inbound stream for a `Pong`.
//! A session that misses the deadline is marked unresponsive and
//! unregistered from the router.
//!
//! Only one ping is ever outstanding per session; sessions still
//! awaiting a pong are skipped on the next tick so probes never pile
//! up.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::ChannelType;
use crate::message::Message;
use crate::router::Router;
use crate::session::NetworkSession;

// ── HeartbeatConfig ──────────────────────────────────────────────

/// Probe cadence and deadline.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between probe rounds.
    pub interval: Duration,

    /// How long a session has to answer a ping.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(5),
        }
    }
}

// ── HeartbeatCoordinator ─────────────────────────────────────────

/// Periodically probes every registered notification session.
pub struct HeartbeatCoordinator {
    router: Arc<Router>,
    config: HeartbeatConfig,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    responsive: Arc<Mutex<HashMap<Uuid, bool>>>,
    shutdown: CancellationToken,
}

impl HeartbeatCoordinator {
    pub fn new(router: Arc<Router>, config: HeartbeatConfig) -> Self {
        Self {
            router,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            responsive: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Last observed liveness for a user's notification session.
    /// `None` until the first probe completes.
    pub fn is_responsive(&self, user: Uuid) -> Option<bool> {
        self.responsive.lock().get(&user).copied()
    }

    /// Begin the probe loop.
    pub fn start(&self) {
        let router = self.router.clone();
        let config = self.config.clone();
        let in_flight = self.in_flight.clone();
        let responsive = self.responsive.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                for (user, session) in router.sessions(ChannelType::Notification) {
                    // Skip sessions still awaiting a prior pong.
                    if !in_flight.lock().insert(user) {
                        continue;
                    }

                    tokio::spawn(probe(
                        user,
                        session,
                        router.clone(),
                        config.timeout,
                        in_flight.clone(),
                        responsive.clone(),
                    ));
                }
            }
            debug!("heartbeat coordinator stopped");
        });
    }

    /// Stop probing. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Send one ping and wait for the pong.
async fn probe(
    user: Uuid,
    session: Arc<NetworkSession>,
    router: Arc<Router>,
    timeout: Duration,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    responsive: Arc<Mutex<HashMap<Uuid, bool>>>,
) {
    // Subscribe before sending so the pong cannot slip past.
    let inbox = session.subscribe();

    let alive = match session.send(Message::Ping).await {
        Ok(()) => await_pong(inbox, timeout).await,
        Err(_) => false,
    };

    responsive.lock().insert(user, alive);

    if alive {
        debug!(user = %user, "heartbeat: responsive");
    } else {
        warn!(user = %user, "heartbeat: unresponsive, evicting");
        router.unregister(user, ChannelType::Notification).await;
    }

    in_flight.lock().remove(&user);
}

/// Watch `inbox` for a pong until `timeout` elapses.
async fn await_pong(mut inbox: broadcast::Receiver<Message>, timeout: Duration) -> bool {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return false,
            received = inbox.recv() => match received {
                Ok(Message::Pong) => return true,
                // Other traffic on the channel does not count.
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
