//! Driver tests against a real local WebSocket server.

use super::*;
use crate::api::fake::FakeApi;
use crate::envelope::{FriendGameSession, FriendRequest};
use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as HandshakeRequest, Response};

const WAIT: Duration = Duration::from_secs(5);

struct ChannelHandler {
    events: mpsc::UnboundedSender<Envelope>,
}

#[async_trait]
impl EnvelopeHandler for ChannelHandler {
    async fn handle(&self, envelope: Envelope) {
        let _ = self.events.send(envelope);
    }
}

struct FixedProbe(AtomicBool);

#[async_trait]
impl LauncherProbe for FixedProbe {
    async fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Harness {
    listener: TcpListener,
    api: Arc<FakeApi>,
    client: WsClient,
    events: mpsc::UnboundedReceiver<Envelope>,
}

async fn harness(base_ms: u64, launcher_running: bool) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let settings = WsSettings {
        url: Url::parse(&format!("ws://{}/", addr)).unwrap(),
        heartbeat_interval: Duration::from_millis(50),
        reconnect_base: Duration::from_millis(base_ms),
        reconnect_max: Duration::from_millis(base_ms * 16),
    };
    let api = Arc::new(FakeApi::new());
    let (events_tx, events) = mpsc::unbounded_channel();
    let client = WsClient::spawn(
        settings,
        api.clone(),
        Arc::new(FixedProbe(AtomicBool::new(launcher_running))),
        Arc::new(ChannelHandler { events: events_tx }),
    );
    Harness {
        listener,
        api,
        client,
        events,
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn wait_for_state(client: &WsClient, want: ConnectionState) {
    let mut state = client.subscribe_state();
    let reached = timeout(WAIT, state.wait_for(|s| *s == want))
        .await
        .map(|result| result.is_ok());
    assert!(matches!(reached, Ok(true)), "never reached {:?}", want);
}

/// Reads until the next text frame.
async fn next_text(server: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let message = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test]
async fn test_opens_with_encoded_token_and_sends_heartbeat() {
    let h = harness(20, false).await;
    h.api.script_ws_tokens(vec![Ok("tok en/1")]);
    h.client.connect();

    let (stream, _) = timeout(WAIT, h.listener.accept()).await.unwrap().unwrap();
    let uri = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&uri);
    let mut server = tokio_tungstenite::accept_hdr_async(
        stream,
        move |request: &HandshakeRequest, response: Response| -> Result<Response, ErrorResponse> {
            *captured.lock().unwrap() = request.uri().to_string();
            Ok(response)
        },
    )
    .await
    .unwrap();

    assert_eq!(next_text(&mut server).await, "PING");
    assert_eq!(uri.lock().unwrap().as_str(), "/?token=tok+en%2F1");
    wait_for_state(&h.client, ConnectionState::Open).await;
    assert_eq!(h.client.attempts(), 1);

    h.client.stop().await;
}

#[tokio::test]
async fn test_bad_frame_does_not_block_following_frames() {
    let mut h = harness(20, false).await;
    h.client.connect();
    let mut server = accept(&h.listener).await;

    let request = Envelope::FriendRequest(FriendRequest {
        sender_id: "u-1".to_string(),
    });
    let session = Envelope::FriendGameSession(FriendGameSession {
        friend_id: "u-2".to_string(),
        object_id: "1245620".to_string(),
    });
    server.send(Message::text("PONG")).await.unwrap();
    server.send(Message::binary(vec![0x0f])).await.unwrap();
    server
        .send(Message::binary(envelope::encode(&request)))
        .await
        .unwrap();
    server
        .send(Message::binary(envelope::encode(&session)))
        .await
        .unwrap();

    let first = timeout(WAIT, h.events.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, h.events.recv()).await.unwrap().unwrap();
    assert_eq!(first, request);
    assert_eq!(second, session);

    h.client.stop().await;
}

#[tokio::test]
async fn test_active_launcher_suppresses_events() {
    let mut h = harness(20, true).await;
    h.client.connect();
    let mut server = accept(&h.listener).await;

    let request = Envelope::FriendRequest(FriendRequest {
        sender_id: "u-1".to_string(),
    });
    server
        .send(Message::binary(envelope::encode(&request)))
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(300), h.events.recv())
        .await
        .is_err());
    h.client.stop().await;
}

#[tokio::test]
async fn test_reconnects_after_transport_drop() {
    let h = harness(20, false).await;
    h.client.connect();

    let first = accept(&h.listener).await;
    wait_for_state(&h.client, ConnectionState::Open).await;
    drop(first);

    let mut second = accept(&h.listener).await;
    assert_eq!(next_text(&mut second).await, "PING");
    assert_eq!(h.client.attempts(), 2);

    h.client.stop().await;
}

#[tokio::test]
async fn test_shutdown_then_forced_close_never_reconnects() {
    let h = harness(20, false).await;
    h.client.connect();
    let mut server = accept(&h.listener).await;
    wait_for_state(&h.client, ConnectionState::Open).await;

    h.client.shutdown();
    wait_for_state(&h.client, ConnectionState::Disconnected).await;

    // Drain until the close handshake finishes, then force the TCP close.
    while let Ok(Some(Ok(message))) = timeout(Duration::from_millis(500), server.next()).await {
        if message.is_close() {
            break;
        }
    }
    drop(server);

    assert!(timeout(Duration::from_millis(300), h.listener.accept())
        .await
        .is_err());
    assert_eq!(h.client.attempts(), 1);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    h.client.stop().await;
}

#[tokio::test]
async fn test_token_failures_retry_with_growing_delay() {
    let h = harness(40, false).await;
    h.api
        .script_ws_tokens(vec![Err("offline"), Err("offline"), Err("offline")]);
    h.client.connect();

    let mut server = accept(&h.listener).await;
    assert_eq!(next_text(&mut server).await, "PING");

    let calls = h.api.ws_token_calls();
    assert_eq!(calls.len(), 4);
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(35), "gaps: {:?}", gaps);
    assert!(gaps[1] >= Duration::from_millis(75), "gaps: {:?}", gaps);
    assert!(gaps[2] >= Duration::from_millis(155), "gaps: {:?}", gaps);

    h.client.stop().await;
}

#[tokio::test]
async fn test_connect_after_shutdown_restarts_cycle() {
    let h = harness(20, false).await;
    h.client.connect();
    let _first = accept(&h.listener).await;
    wait_for_state(&h.client, ConnectionState::Open).await;

    h.client.shutdown();
    wait_for_state(&h.client, ConnectionState::Disconnected).await;

    h.client.connect();
    let mut second = accept(&h.listener).await;
    assert_eq!(next_text(&mut second).await, "PING");
    assert_eq!(h.client.attempts(), 2);

    h.client.stop().await;
}

#[test]
fn test_socket_url_appends_token() {
    let base = Url::parse("wss://ws.hydralauncher.gg").unwrap();
    assert_eq!(
        socket_url(&base, "a&b=c").as_str(),
        "wss://ws.hydralauncher.gg/?token=a%26b%3Dc"
    );
}

#[test]
fn test_settings_follow_config() {
    let settings = WsSettings::from_config(&CompanionConfig::default()).unwrap();
    assert_eq!(settings.heartbeat_interval, Duration::from_secs(15));
    assert_eq!(settings.reconnect_base, Duration::from_millis(1000));
    assert_eq!(settings.reconnect_max, Duration::from_millis(30_000));
}
