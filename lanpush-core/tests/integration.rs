//! Integration tests — full registration, routing, and heartbeat
//! lifecycle over real TCP connections on localhost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lanpush_core::{
    Channel, ChannelConfig, ChannelType, HeartbeatConfig, HeartbeatCoordinator, Message,
    NetworkSession, PushError, Response, Router, SessionConfig, TextMessage, User,
};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up control + notification channels on OS-assigned ports.
async fn start_server(router: Arc<Router>) -> (SocketAddr, SocketAddr) {
    let config = ChannelConfig {
        registration_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let control = Channel::new(0, ChannelType::Control, router.clone(), config.clone());
    let notification = Channel::new(0, ChannelType::Notification, router.clone(), config);

    // The accept loops outlive these handles.
    let control_addr = control.start().await.unwrap();
    let notification_addr = notification.start().await.unwrap();

    (
        SocketAddr::from(([127, 0, 0, 1], control_addr.port())),
        SocketAddr::from(([127, 0, 0, 1], notification_addr.port())),
    )
}

/// The server-side dispatch loop: answer control-channel requests
/// wrapping a `TextMessage` by routing to the recipient's
/// notification session.
fn spawn_text_dispatch(router: Arc<Router>) {
    let mut registrations = router.take_registrations().unwrap();
    tokio::spawn(async move {
        while let Some(registration) = registrations.recv().await {
            if registration.channel_type != ChannelType::Control {
                continue;
            }
            let router = router.clone();
            let session = registration.session.clone();
            let mut inbox = registration.inbox;
            tokio::spawn(async move {
                loop {
                    match inbox.recv().await {
                        Ok(Message::Request(request)) => {
                            let response = match request.message() {
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
                                Ok(other) => Response::error(
                                    request.id,
                                    format!("unsupported request: {}", other.kind()),
                                ),
                                Err(e) => Response::error(request.id, e.to_string()),
                            };
                            let _ = session.send(Message::Response(response)).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
    });
}

struct TestClient {
    user: User,
    control: Arc<NetworkSession>,
    notification: Arc<NetworkSession>,
    delivered: mpsc::Receiver<TextMessage>,
}

/// Connect both channels, register, and answer heartbeat pings.
async fn connect_client(
    device_name: &str,
    control_addr: SocketAddr,
    notification_addr: SocketAddr,
) -> TestClient {
    let user = User::new(device_name);

    let control_stream = TcpStream::connect(control_addr).await.unwrap();
    let (control, _) = NetworkSession::connect(control_stream, SessionConfig::default());

    let notification_stream = TcpStream::connect(notification_addr).await.unwrap();
    let (notification, mut notification_inbox) = NetworkSession::connect(
        notification_stream,
        SessionConfig {
            disconnect_on_failure: false,
            ..Default::default()
        },
    );

    control.send(Message::User(user.clone())).await.unwrap();
    notification.send(Message::User(user.clone())).await.unwrap();

    let (delivered_tx, delivered) = mpsc::channel(16);
    let ponger = notification.clone();
    tokio::spawn(async move {
        loop {
            match notification_inbox.recv().await {
                Ok(Message::Ping) => {
                    if ponger.send(Message::Pong).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Text(text)) => {
                    let _ = delivered_tx.send(text).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    TestClient {
        user,
        control,
        notification,
        delivered,
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}

// ── Message delivery ─────────────────────────────────────────────

#[tokio::test]
async fn text_message_reaches_recipient_notification_channel() {
    let router = Router::new();
    spawn_text_dispatch(router.clone());
    let (control_addr, notification_addr) = start_server(router.clone()).await;

    let a = connect_client("A", control_addr, notification_addr).await;
    let mut b = connect_client("B", control_addr, notification_addr).await;

    wait_until("both clients registered", || router.len() == 4).await;

    let text = TextMessage::new(a.user.id, b.user.id, "hi");
    let response = a
        .control
        .request(&Message::Text(text.clone()))
        .await
        .unwrap();
    assert!(response.is_ok());

    let received = tokio::time::timeout(Duration::from_secs(3), b.delivered.recv())
        .await
        .expect("delivery timed out")
        .expect("delivery stream closed");
    assert_eq!(received.body, "hi");
    assert_eq!(received.sender, a.user.id);
    assert_eq!(received, text);
}

#[tokio::test]
async fn delivery_to_unknown_user_is_reported_to_sender() {
    let router = Router::new();
    spawn_text_dispatch(router.clone());
    let (control_addr, notification_addr) = start_server(router.clone()).await;

    let a = connect_client("A", control_addr, notification_addr).await;
    wait_until("client registered", || router.len() == 2).await;

    let nobody = uuid::Uuid::new_v4();
    let text = TextMessage::new(a.user.id, nobody, "anyone there?");
    let response = a.control.request(&Message::Text(text)).await.unwrap();
    assert!(!response.is_ok());
    assert!(response.error.unwrap().contains("not reachable"));
}

// ── Registration invariants ──────────────────────────────────────

#[tokio::test]
async fn re_registration_replaces_prior_session() {
    let router = Router::new();
    let (control_addr, notification_addr) = start_server(router.clone()).await;

    let a = connect_client("A", control_addr, notification_addr).await;
    wait_until("first registration", || router.len() == 2).await;

    // The same user registers a second control session.
    let stream = TcpStream::connect(control_addr).await.unwrap();
    let (second_control, _) = NetworkSession::connect(stream, SessionConfig::default());
    second_control
        .send(Message::User(a.user.clone()))
        .await
        .unwrap();

    wait_until("prior session disconnected", || !a.control.is_connected()).await;

    // Still exactly one control entry for the user, and it is live.
    assert!(router.is_registered(a.user.id, ChannelType::Control));
    assert_eq!(router.len(), 2);
    assert!(second_control.is_connected());
}

// ── Heartbeat ────────────────────────────────────────────────────

#[tokio::test]
async fn dead_notification_session_is_evicted_and_unroutable() {
    let router = Router::new();
    let (control_addr, notification_addr) = start_server(router.clone()).await;

    let a = connect_client("A", control_addr, notification_addr).await;
    wait_until("registration", || router.len() == 2).await;

    let coordinator = HeartbeatCoordinator::new(
        router.clone(),
        HeartbeatConfig {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(200),
        },
    );
    coordinator.start();

    // Kill the client's notification session mid-heartbeat; the
    // ponger goes silent and the server must evict the entry.
    a.notification.disconnect().await;

    wait_until("heartbeat eviction", || {
        !router.is_registered(a.user.id, ChannelType::Notification)
    })
    .await;
    coordinator.stop();

    let err = router
        .route(Message::Ping, a.user.id, ChannelType::Notification)
        .await
        .unwrap_err();
    assert!(matches!(err, PushError::UserNotReachable { .. }));
}

// ── Request plumbing over real TCP ───────────────────────────────

#[tokio::test]
async fn unsupported_request_is_answered_not_dropped() {
    let router = Router::new();
    spawn_text_dispatch(router.clone());
    let (control_addr, notification_addr) = start_server(router.clone()).await;

    let mut a = connect_client("A", control_addr, notification_addr).await;
    wait_until("registration", || router.len() == 2).await;

    let response = a.control.request(&Message::Pong).await.unwrap();
    assert!(!response.is_ok());
    assert!(response.error.unwrap().contains("unsupported"));

    // The connection survives and keeps serving requests.
    let text = TextMessage::new(a.user.id, a.user.id, "note to self");
    let response = a.control.request(&Message::Text(text)).await.unwrap();
    assert!(response.is_ok());

    let received = tokio::time::timeout(Duration::from_secs(3), a.delivered.recv())
        .await
        .expect("delivery timed out")
        .expect("delivery stream closed");
    assert_eq!(received.body, "note to self");
}
