// Realtime channel tests against an in-process WebSocket server
// Author: kelexine (https://github.com/kelexine)

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};
use wagate::config::RealtimeConfig;
use wagate::error::PortalError;
use wagate::realtime::{
    ChannelMessage, ConnectionStatus, Phase, RealtimeChannel, StaticCredential, NORMAL_CLOSURE,
};

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

fn test_config(ws_url: &str) -> RealtimeConfig {
    RealtimeConfig {
        ws_url: Some(ws_url.to_string()),
        reconnect_delay_ms: 50,
        max_reconnect_attempts: 3,
        heartbeat_interval_ms: 60_000,
        ..RealtimeConfig::default()
    }
}

fn channel_for(config: RealtimeConfig) -> RealtimeChannel {
    RealtimeChannel::new(config, Arc::new(StaticCredential::new("session-token")))
}

/// Accept WebSocket clients forever, handing each socket to the test.
fn serve(listener: TcpListener) -> (mpsc::UnboundedReceiver<ServerSocket>, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Ok(socket) = accept_async(stream).await {
                if tx.send(socket).is_err() {
                    break;
                }
            }
        }
    });

    (rx, accepted)
}

async fn wait_status<F>(channel: &RealtimeChannel, predicate: F) -> ConnectionStatus
where
    F: FnMut(&ConnectionStatus) -> bool,
{
    let mut rx = channel.status_receiver();
    let status = timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
        .clone();
    status
}

async fn next_text(socket: &mut ServerSocket) -> ChannelMessage {
    loop {
        let frame = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client went away")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("client sent malformed JSON");
        }
    }
}

fn envelope(event: &str, data: serde_json::Value) -> Message {
    Message::Text(
        json!({
            "type": "message",
            "event": event,
            "data": data,
            "timestamp": "2025-01-01T00:00:00Z"
        })
        .to_string(),
    )
}

#[tokio::test]
async fn test_token_is_passed_as_query_parameter() {
    let (listener, url) = bind().await;
    let (uri_tx, mut uri_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| {
            let _ = uri_tx.send(request.uri().to_string());
            Ok::<_, ErrorResponse>(response)
        };
        let mut socket = accept_hdr_async(stream, callback).await.unwrap();
        while socket.next().await.is_some() {}
    });

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();

    let uri = timeout(WAIT, uri_rx.recv()).await.unwrap().unwrap();
    assert_eq!(uri, "/ws?token=session-token");
    wait_status(&channel, |s| s.connected).await;
    channel.disconnect();
}

#[tokio::test]
async fn test_events_are_routed_and_malformed_payloads_dropped() {
    let (listener, url) = bind().await;
    let (mut sockets, _) = serve(listener);

    let channel = channel_for(test_config(&url));
    let mut received = channel.on("message.received");
    let mut everything = channel.connect().unwrap();

    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    server.send(Message::Text("not json".to_string())).await.unwrap();
    server.send(Message::Text(r#"{"event":"missing-fields"}"#.to_string())).await.unwrap();
    server.send(envelope("device.status", json!({"device": "d1", "online": true}))).await.unwrap();
    server.send(envelope("message.received", json!({"from": "+15550001"}))).await.unwrap();

    let first = timeout(WAIT, everything.next()).await.unwrap().unwrap();
    assert_eq!(first.event, "device.status");

    let routed = timeout(WAIT, received.next()).await.unwrap().unwrap();
    assert_eq!(routed.event, "message.received");
    assert_eq!(routed.data["from"], "+15550001");

    // bad frames did not tear the socket down
    assert!(channel.is_connected());
    assert_eq!(channel.status(), ConnectionStatus::open());
    channel.disconnect();
}

#[tokio::test]
async fn test_dropping_one_subscriber_leaves_others_running() {
    let (listener, url) = bind().await;
    let (mut sockets, _) = serve(listener);

    let channel = channel_for(test_config(&url));
    let dropped = channel.on("device.status");
    let mut kept = channel.on("device.status");
    channel.connect().unwrap();
    drop(dropped);

    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    server.send(envelope("device.status", json!({"n": 1}))).await.unwrap();
    server.send(envelope("device.status", json!({"n": 2}))).await.unwrap();

    let a = timeout(WAIT, kept.next()).await.unwrap().unwrap();
    let b = timeout(WAIT, kept.next()).await.unwrap().unwrap();
    assert_eq!(a.data["n"], 1);
    assert_eq!(b.data["n"], 2);
    channel.disconnect();
}

#[tokio::test]
async fn test_send_reaches_server() {
    let (listener, url) = bind().await;
    let (mut sockets, _) = serve(listener);

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();
    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;

    channel.send_event("message.send", json!({"to": "+15550002", "text": "hi"}));

    let message = next_text(&mut server).await;
    assert_eq!(message.kind, "message");
    assert_eq!(message.event, "message.send");
    assert_eq!(message.data["text"], "hi");
    channel.disconnect();
}

#[tokio::test]
async fn test_send_while_disconnected_is_a_logged_noop() {
    let channel = channel_for(test_config("ws://127.0.0.1:9/ws"));
    channel.send_event("message.send", json!({}));
    assert!(!channel.is_connected());
    assert_eq!(channel.status(), ConnectionStatus::closed());
}

#[tokio::test]
async fn test_heartbeat_pings_while_open() {
    let (listener, url) = bind().await;
    let (mut sockets, _) = serve(listener);

    let mut config = test_config(&url);
    config.heartbeat_interval_ms = 50;
    let channel = channel_for(config);
    channel.connect().unwrap();

    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    let ping = next_text(&mut server).await;
    assert_eq!(ping.kind, "ping");
    channel.disconnect();
}

#[tokio::test]
async fn test_disconnect_sends_normal_closure_and_stays_down() {
    let (listener, url) = bind().await;
    let (mut sockets, accepted) = serve(listener);

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();
    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;

    channel.disconnect();
    assert!(!channel.is_connected());
    assert_eq!(channel.status(), ConnectionStatus::closed());
    assert_eq!(channel.phase(), Phase::Idle);

    let close_code = loop {
        match timeout(WAIT, server.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => continue,
            other => panic!("expected a close frame, got {:?}", other),
        }
    };
    assert_eq!(close_code, Some(NORMAL_CLOSURE));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(channel.status(), ConnectionStatus::closed());
}

#[tokio::test]
async fn test_disconnect_before_connect_is_safe() {
    let channel = channel_for(test_config("ws://127.0.0.1:9/ws"));
    channel.disconnect();
    channel.disconnect();
    assert_eq!(channel.status(), ConnectionStatus::closed());
}

#[tokio::test]
async fn test_connect_is_idempotent_while_open() {
    let (listener, url) = bind().await;
    let (mut sockets, accepted) = serve(listener);

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();
    let _server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;

    channel.connect().unwrap();
    channel.clone().connect().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    channel.disconnect();
}

#[tokio::test]
async fn test_abnormal_close_reconnects_automatically() {
    let (listener, url) = bind().await;
    let (mut sockets, accepted) = serve(listener);

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();

    let first = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;
    // vanish without a close handshake
    drop(first);

    let _second = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert!(channel.is_connected());
    channel.disconnect();
}

#[tokio::test]
async fn test_server_normal_closure_is_not_retried() {
    let (listener, url) = bind().await;
    let (mut sockets, accepted) = serve(listener);

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();
    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;

    server
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    wait_status(&channel, |s| !s.connected).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(channel.status(), ConnectionStatus::closed());
}

#[tokio::test]
async fn test_gives_up_after_max_consecutive_failures() {
    let (listener, url) = bind().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    // accept TCP and hang up before the WebSocket handshake
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    let channel = channel_for(test_config(&url));
    channel.connect().unwrap();

    let status = wait_status(&channel, |s| s.error.is_some()).await;
    assert!(!status.connected);
    assert!(!status.reconnecting);
    assert_eq!(status.error.as_deref(), Some("Max reconnection attempts reached"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(channel.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_missing_credential_fails_fast_without_retry() {
    let channel = RealtimeChannel::new(
        test_config("ws://127.0.0.1:9/ws"),
        Arc::new(StaticCredential::none()),
    );

    let result = channel.connect();
    assert!(matches!(result, Err(PortalError::MissingCredential)));

    let status = channel.status();
    assert!(!status.connected);
    assert!(!status.reconnecting);
    assert!(status.error.is_some());
    assert_eq!(channel.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_unresolvable_endpoint_fails_fast() {
    let channel = channel_for(RealtimeConfig::default());

    let result = channel.connect();
    assert!(matches!(result, Err(PortalError::Endpoint(_))));
    assert!(channel.status().error.is_some());
    assert_eq!(channel.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_status_stream_starts_with_current_state() {
    let channel = channel_for(test_config("ws://127.0.0.1:9/ws"));
    let mut statuses = channel.status_stream();

    let first = timeout(WAIT, statuses.next()).await.unwrap().unwrap();
    assert_eq!(first, ConnectionStatus::closed());
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let (listener, url) = bind().await;
    let (mut sockets, accepted) = serve(listener);

    let mut config = test_config(&url);
    config.reconnect_delay_ms = 300;
    let channel = channel_for(config);
    channel.connect().unwrap();

    let first = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;
    drop(first);
    wait_status(&channel, |s| s.reconnecting).await;

    channel.disconnect();
    let mut after = channel.status_receiver();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!after.has_changed().unwrap());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(channel.status(), ConnectionStatus::closed());
    assert_eq!(channel.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_successful_open_restores_reconnect_budget() {
    let (listener, url) = bind().await;
    let (mut sockets, accepted) = serve(listener);

    // without a reset the second drop would exhaust a budget of two
    let mut config = test_config(&url);
    config.max_reconnect_attempts = 2;
    let channel = channel_for(config);
    channel.connect().unwrap();

    for _ in 0..2 {
        let socket = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
        wait_status(&channel, |s| s.connected).await;
        drop(socket);
    }

    let _third = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    wait_status(&channel, |s| s.connected).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    channel.disconnect();
}

#[tokio::test]
async fn test_heartbeat_restarts_with_each_connection() {
    let (listener, url) = bind().await;
    let (mut sockets, _) = serve(listener);

    let mut config = test_config(&url);
    config.heartbeat_interval_ms = 50;
    let channel = channel_for(config);
    channel.connect().unwrap();

    let mut first = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    assert_eq!(next_text(&mut first).await.kind, "ping");
    drop(first);

    let mut second = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    assert_eq!(next_text(&mut second).await.kind, "ping");
    channel.disconnect();
}

#[tokio::test]
async fn test_lagging_subscriber_skips_oldest_messages() {
    let (listener, url) = bind().await;
    let (mut sockets, _) = serve(listener);

    let mut config = test_config(&url);
    config.inbound_buffer = 2;
    let channel = channel_for(config);
    let mut slow = channel.connect().unwrap();

    let mut server = timeout(WAIT, sockets.recv()).await.unwrap().unwrap();
    for n in 1..=5 {
        server.send(envelope("device.status", json!({ "n": n }))).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let oldest_kept = timeout(WAIT, slow.next()).await.unwrap().unwrap();
    let newest = timeout(WAIT, slow.next()).await.unwrap().unwrap();
    assert_eq!(oldest_kept.data["n"], 4);
    assert_eq!(newest.data["n"], 5);
    assert!(channel.is_connected());
    channel.disconnect();
}
