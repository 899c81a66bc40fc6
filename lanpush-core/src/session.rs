//! `NetworkSession` — one live connection, framed message I/O, and
//! request/response correlation.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────────────────────┐
//!                │          NetworkSession          │
//!                ├──────────────────────────────────┤
//!                │  outbound: mpsc ──► writer task  │
//!                │  reader task ──► dispatch        │
//!                │  pending: HashMap<request_id,    │
//!                │           oneshot::Sender>       │
//!                │  inbound: broadcast (unsolicited)│
//!                └──────────────────────────────────┘
//! ```
//!
//! The reader task is the only consumer of the transport. A received
//! `Response` whose id matches an outstanding request resolves that
//! request's oneshot waiter; everything else is published on the
//! inbound broadcast channel.
//!
//! The session exclusively owns its transport. `disconnect()` is
//! idempotent and closes the transport exactly once (the writer task
//! owns the close path), no matter how many failure paths race.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, trace, warn};

use crate::codec::{MAX_FRAME_SIZE, MessageCodec};
use crate::error::PushError;
use crate::message::{Message, Request, Response};
use crate::state::SessionState;

/// Capacity of the outbound queue and the inbound broadcast buffer.
const QUEUE_DEPTH: usize = 64;

/// Monotonic source of process-unique session ids.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ── SessionConfig ────────────────────────────────────────────────

/// Tuning knobs for a single session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for a correlated `request()` call.
    pub request_timeout: Duration,

    /// When `true` (the default), any request failure tears the whole
    /// session down. Background push-style connections set this to
    /// `false` so a failed probe only reports to its caller and the
    /// connection stays alive for retry.
    pub disconnect_on_failure: bool,

    /// Payload ceiling handed to the framer.
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            disconnect_on_failure: true,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

// ── NetworkSession ───────────────────────────────────────────────

type PendingMap = HashMap<u64, oneshot::Sender<Result<Response, PushError>>>;

/// One-to-one owner of a single live connection.
pub struct NetworkSession {
    id: u64,
    config: SessionConfig,
    outbound: mpsc::Sender<Message>,
    /// `None` once the session is torn down, which drops the sender
    /// and lets every subscriber's `recv()` observe `Closed`.
    inbound: Mutex<Option<broadcast::Sender<Message>>>,
    pending: Mutex<PendingMap>,
    state: Mutex<SessionState>,
    next_request_id: AtomicU64,
    shutdown: CancellationToken,
}

impl NetworkSession {
    /// Take ownership of an established transport and begin reading
    /// frames.
    ///
    /// The transport only needs to be `AsyncRead + AsyncWrite`; TLS
    /// streams plug in the same way as plain TCP. Returns the session
    /// together with an inbound receiver that was subscribed *before*
    /// the reader started, so no early message can be missed.
    pub fn connect<T>(transport: T, config: SessionConfig) -> (Arc<Self>, broadcast::Receiver<Message>)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let codec = MessageCodec::with_max_frame_size(config.max_frame_size);
        let (mut sink, mut stream) = Framed::new(transport, codec).split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = broadcast::channel(QUEUE_DEPTH);

        let session = Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            config,
            outbound: outbound_tx,
            inbound: Mutex::new(Some(inbound_tx)),
            pending: Mutex::new(HashMap::new()),
            state: Mutex::new(SessionState::default()),
            next_request_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        {
            // The transport handle is already established, so the
            // connecting phase is immediate.
            let mut state = session.state.lock();
            let _ = state.begin_connect();
            let _ = state.complete_connect();
        }

        // Writer task: session -> network. Sole owner of the close path.
        tokio::spawn({
            let session = session.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = session.shutdown.cancelled() => break,
                        maybe = outbound_rx.recv() => match maybe {
                            Some(message) => {
                                trace!(session = session.id, kind = %message.kind(), "write");
                                if let Err(e) = sink.send(message).await {
                                    warn!(session = session.id, error = %e, "network write error");
                                    session.fail();
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
                let _ = sink.close().await;
            }
        });

        // Reader task: network -> session.
        tokio::spawn({
            let session = session.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = session.shutdown.cancelled() => break,
                        next = stream.next() => match next {
                            Some(Ok(message)) => session.dispatch(message),
                            Some(Err(e)) => {
                                warn!(session = session.id, error = %e, "network read error");
                                session.fail();
                                break;
                            }
                            None => {
                                debug!(session = session.id, "peer closed connection");
                                session.remote_closed();
                                break;
                            }
                        },
                    }
                }
            }
        });

        (session, inbound_rx)
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Process-unique identifier for this session.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot of the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Whether the session is ready for protocol traffic.
    pub fn is_connected(&self) -> bool {
        self.state.lock().is_connected()
    }

    /// Subscribe to unsolicited inbound messages (server pushes,
    /// heartbeat pings). Responses to outstanding requests are routed
    /// to their waiters instead and never appear here. After teardown
    /// the returned receiver reports `Closed` immediately.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        match self.inbound.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            // Session already torn down: a receiver with no sender.
            None => broadcast::channel(1).1,
        }
    }

    /// Resolves once the session has been torn down, by whatever path.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.shutdown.clone().cancelled_owned()
    }

    // ── Operations ───────────────────────────────────────────────

    /// Enqueue a message for framing and transmission.
    pub async fn send(&self, message: Message) -> Result<(), PushError> {
        if !self.is_connected() {
            return Err(PushError::NotConnected);
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| PushError::ConnectionLost)
    }

    /// Send `message` wrapped in a fresh request envelope and suspend
    /// until the correlated response arrives or the configured timeout
    /// elapses.
    ///
    /// At most one waiter exists per correlation id; concurrent call
    /// sites each get their own id. On failure the
    /// `disconnect_on_failure` policy decides whether the whole
    /// session is torn down.
    pub async fn request(&self, message: &Message) -> Result<Response, PushError> {
        if !self.is_connected() {
            return Err(PushError::NotConnected);
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.lock().insert(id, waiter_tx);

        let envelope = Message::Request(Request::wrapping(id, message)?);
        if let Err(e) = self.send(envelope).await {
            self.pending.lock().remove(&id);
            if self.config.disconnect_on_failure {
                self.disconnect().await;
            }
            return Err(e);
        }

        let outcome = tokio::select! {
            resolved = waiter_rx => match resolved {
                Ok(result) => result,
                Err(_) => Err(PushError::ConnectionLost),
            },
            _ = tokio::time::sleep(self.config.request_timeout) => {
                self.pending.lock().remove(&id);
                Err(PushError::RequestTimedOut {
                    id,
                    timeout: self.config.request_timeout,
                })
            }
            _ = self.shutdown.cancelled() => {
                self.pending.lock().remove(&id);
                Err(PushError::Cancelled)
            }
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(e) => {
                if self.config.disconnect_on_failure && !matches!(e, PushError::Cancelled) {
                    debug!(session = self.id, error = %e, "request failed; tearing session down");
                    self.disconnect().await;
                }
                Err(e)
            }
        }
    }

    /// Tear the session down. Idempotent and safe from any concurrent
    /// failure path; in-flight `request()` callers resolve with
    /// `Cancelled`.
    pub async fn disconnect(&self) {
        self.state.lock().force_disconnect();
        self.drain_pending(|| PushError::Cancelled);
        self.close_inbound();
        self.shutdown.cancel();
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Route one inbound message: correlated responses to their
    /// waiters, everything else to subscribers.
    fn dispatch(&self, message: Message) {
        if let Message::Response(response) = &message {
            if let Some(waiter) = self.pending.lock().remove(&response.id) {
                let _ = waiter.send(Ok(response.clone()));
                return;
            }
        }
        // Unsolicited; delivery is best-effort when nobody subscribes.
        if let Some(sender) = self.inbound.lock().as_ref() {
            let _ = sender.send(message);
        }
    }

    /// Transport-level failure: mark failed, resolve waiters, cancel.
    fn fail(&self) {
        let _ = self.state.lock().mark_failed();
        self.drain_pending(|| PushError::ConnectionLost);
        self.close_inbound();
        self.shutdown.cancel();
    }

    /// Clean EOF from the peer: transition straight to disconnected.
    fn remote_closed(&self) {
        self.state.lock().force_disconnect();
        self.drain_pending(|| PushError::ConnectionLost);
        self.close_inbound();
        self.shutdown.cancel();
    }

    /// Drop the broadcast sender so every subscriber, including ones
    /// holding this session alive, observes `Closed` after draining
    /// any buffered messages.
    fn close_inbound(&self) {
        self.inbound.lock().take();
    }

    fn drain_pending(&self, reason: impl Fn() -> PushError) {
        let waiters: Vec<_> = self.pending.lock().drain().collect();
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(reason()));
        }
    }
}

impl std::fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSession")
            .field("id", &self.id)
            .field("state", &self.state.lock())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
