//! `PushClient` — client-side assembly of the two channel sessions.
//!
//! Connecting opens a control session and a notification session,
//! registers the same user identity on both, and spawns a task on the
//! notification session that answers server pings and forwards
//! delivered text messages to the caller.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use lanpush_core::{Message, NetworkSession, PushError, SessionConfig, TextMessage, User};

pub struct PushClient {
    user: User,
    control: Arc<NetworkSession>,
    notification: Arc<NetworkSession>,
}

impl PushClient {
    /// Connect and register both channels. Returns the client and the
    /// stream of text messages delivered to this user.
    pub async fn connect(
        host: &str,
        control_port: u16,
        notification_port: u16,
        device_name: &str,
    ) -> Result<(Self, mpsc::Receiver<TextMessage>), PushError> {
        let user = User::new(device_name);

        let control_stream = TcpStream::connect((host, control_port)).await?;
        let (control, _) = NetworkSession::connect(control_stream, SessionConfig::default());

        // The notification session must ride out individual request
        // failures; only the transport dying should take it down.
        let notification_stream = TcpStream::connect((host, notification_port)).await?;
        let (notification, inbox) = NetworkSession::connect(
            notification_stream,
            SessionConfig {
                disconnect_on_failure: false,
                ..Default::default()
            },
        );

        control.send(Message::User(user.clone())).await?;
        notification.send(Message::User(user.clone())).await?;
        debug!(user = %user, "registered on both channels");

        let (delivered_tx, delivered_rx) = mpsc::channel(64);
        tokio::spawn(notification_loop(notification.clone(), inbox, delivered_tx));

        let client = Self {
            user,
            control,
            notification,
        };
        Ok((client, delivered_rx))
    }

    /// This client's registered identity.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Send a text message to `recipient`, waiting for the server's
    /// acknowledgement. A server-side refusal (recipient offline,
    /// malformed payload) surfaces as [`PushError::Rejected`].
    pub async fn send_text(&self, recipient: Uuid, body: &str) -> Result<(), PushError> {
        let text = TextMessage::new(self.user.id, recipient, body);
        let response = self.control.request(&Message::Text(text)).await?;
        match response.error {
            None => Ok(()),
            Some(reason) => Err(PushError::Rejected(reason)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_connected() && self.notification.is_connected()
    }

    /// Tear down both sessions. Idempotent.
    pub async fn disconnect(&self) {
        self.control.disconnect().await;
        self.notification.disconnect().await;
    }
}

/// Answer pings and forward deliveries until the session closes.
async fn notification_loop(
    session: Arc<NetworkSession>,
    mut inbox: broadcast::Receiver<Message>,
    delivered: mpsc::Sender<TextMessage>,
) {
    loop {
        match inbox.recv().await {
            Ok(Message::Ping) => {
                if session.send(Message::Pong).await.is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                if delivered.send(text).await.is_err() {
                    // Caller dropped the delivery stream.
                    break;
                }
            }
            Ok(other) => {
                debug!(kind = %other.kind(), "ignoring message on notification channel");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification inbox lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("notification loop ended");
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lanpush_server::config::ServerConfig;
    use lanpush_server::server::PushServer;

    async fn start_server() -> (PushServer, u16, u16) {
        let mut config = ServerConfig::default();
        config.network.control_port = 0;
        config.network.notification_port = 0;
        let server = PushServer::new(&config);
        let (control, notification) = server.start().await.unwrap();
        (server, control.port(), notification.port())
    }

    #[tokio::test]
    async fn send_and_receive_between_clients() {
        let (server, control_port, notification_port) = start_server().await;

        let (alice, _alice_rx) =
            PushClient::connect("127.0.0.1", control_port, notification_port, "alice")
                .await
                .unwrap();
        let (bob, mut bob_rx) =
            PushClient::connect("127.0.0.1", control_port, notification_port, "bob")
                .await
                .unwrap();

        // Registration is asynchronous; retry until the server has
        // bob's notification session.
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match alice.send_text(bob.user().id, "lunch?").await {
                    Ok(()) => break,
                    Err(PushError::Rejected(_)) => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    Err(e) => panic!("send failed: {e}"),
                }
            }
        })
        .await
        .expect("send never succeeded");

        let received = tokio::time::timeout(Duration::from_secs(2), bob_rx.recv())
            .await
            .expect("delivery timed out")
            .expect("delivery stream closed");
        assert_eq!(received.body, "lunch?");
        assert_eq!(received.sender, alice.user().id);

        alice.disconnect().await;
        bob.disconnect().await;
        server.stop();
    }

    #[tokio::test]
    async fn send_to_offline_user_is_rejected() {
        let (server, control_port, notification_port) = start_server().await;

        let (alice, _rx) =
            PushClient::connect("127.0.0.1", control_port, notification_port, "alice")
                .await
                .unwrap();

        // Give registration a moment, then target a user nobody owns.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = alice
            .send_text(Uuid::new_v4(), "anyone?")
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Rejected(_)));
        assert!(alice.is_connected());

        alice.disconnect().await;
        server.stop();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (server, control_port, notification_port) = start_server().await;
        let (client, _rx) =
            PushClient::connect("127.0.0.1", control_port, notification_port, "solo")
                .await
                .unwrap();

        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
        server.stop();
    }
}
