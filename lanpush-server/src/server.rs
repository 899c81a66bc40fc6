//! `PushServer` — the full server assembly.
//!
//! Binds one listener per channel type, starts the heartbeat
//! coordinator, and consumes the router's registration stream: every
//! control session gets a handler task that answers `Request` frames
//! by routing the wrapped text message to the recipient's
//! notification session.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use lanpush_core::{
    Channel, ChannelType, HeartbeatCoordinator, Message, PushError, Registration, Request,
    Response, Router,
};

use crate::config::ServerConfig;

/// Owns the channels, router, and heartbeat for one server instance.
pub struct PushServer {
    router: Arc<Router>,
    control: Channel,
    notification: Channel,
    heartbeat: HeartbeatCoordinator,
}

impl PushServer {
    pub fn new(config: &ServerConfig) -> Self {
        let router = Router::new();
        let channel_config = config.to_channel_config();
        Self {
            control: Channel::new(
                config.network.control_port,
                ChannelType::Control,
                router.clone(),
                channel_config.clone(),
            ),
            notification: Channel::new(
                config.network.notification_port,
                ChannelType::Notification,
                router.clone(),
                channel_config,
            ),
            heartbeat: HeartbeatCoordinator::new(router.clone(), config.to_heartbeat_config()),
            router,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Bind both listeners and start the heartbeat and dispatch
    /// loops. Returns the bound (control, notification) addresses.
    pub async fn start(&self) -> Result<(SocketAddr, SocketAddr), PushError> {
        let control_addr = self.control.start().await?;
        let notification_addr = self.notification.start().await?;
        self.heartbeat.start();

        let registrations = self
            .router
            .take_registrations()
            .ok_or(PushError::ProtocolViolation("server already started"))?;
        let router = self.router.clone();
        tokio::spawn(async move {
            let mut registrations = registrations;
            while let Some(registration) = registrations.recv().await {
                if registration.channel_type == ChannelType::Control {
                    tokio::spawn(handle_control_session(router.clone(), registration));
                }
            }
        });

        info!(control = %control_addr, notification = %notification_addr, "server started");
        Ok((control_addr, notification_addr))
    }

    /// Stop listeners and heartbeat. Registered sessions are
    /// disconnected as their handlers wind down.
    pub fn stop(&self) {
        self.control.stop();
        self.notification.stop();
        self.heartbeat.stop();
        info!("server stopped");
    }
}

/// Serve one registered control session until it closes.
async fn handle_control_session(router: Arc<Router>, registration: Registration) {
    let user = registration.user;
    let session = registration.session;
    let mut inbox = registration.inbox;
    debug!(user = %user, "control handler attached");

    loop {
        match inbox.recv().await {
            Ok(Message::Request(request)) => {
                let response = service_request(&router, &request).await;
                if session.send(Message::Response(response)).await.is_err() {
                    break;
                }
            }
            Ok(other) => {
                debug!(user = %user, kind = %other.kind(), "ignoring non-request on control channel");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(user = %user, skipped, "control inbox lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!(user = %user, "control handler detached");
}

/// Answer one control request. A `Text` payload is routed to the
/// recipient's notification session; everything else is refused with
/// an error response rather than a dropped connection.
async fn service_request(router: &Arc<Router>, request: &Request) -> Response {
    match request.message() {
        Ok(Message::Text(text)) => {
            let recipient = text.recipient;
            match router
                .route(Message::Text(text), recipient, ChannelType::Notification)
                .await
            {
                Ok(()) => Response::ok(request.id),
                Err(e) => Response::error(request.id, e.to_string()),
            }
        }
        Ok(other) => Response::error(request.id, format!("unsupported request: {}", other.kind())),
        Err(e) => Response::error(request.id, e.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────
