//! Producer and viewer sockets against a live relay.
//!
//! Each test binds the full router to an ephemeral port and talks to it
//! with a real WebSocket client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tether_relay::auth::StaticTokens;
use tether_relay::config::Config;
use tether_relay::http::build_router;
use tether_relay::server::TetherRelay;
use tether_relay::storage::SqliteStore;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const TOKEN: &str = "device-token";
const SID: &str = "01HQXK7V8G3N5M2R4P6T1W9Y0Z";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(mut config: Config) -> SocketAddr {
    let mut tokens = HashMap::new();
    tokens.insert(TOKEN.to_string(), "alice".to_string());
    config.auth.tokens = tokens;

    let verifier = StaticTokens::from_config(&config.auth);
    let store = SqliteStore::in_memory().await.unwrap();
    let relay = Arc::new(TetherRelay::new(config, Arc::new(store), Arc::new(verifier)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(relay);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, role: &str) -> Socket {
    let url = format!("ws://{addr}/sessions/{SID}/{role}?token={TOKEN}");
    connect_async(url).await.unwrap().0
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next JSON frame, skipping relay heartbeats.
async fn recv(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] != "ping" {
                return value;
            }
        }
    }
}

/// Wait for the close frame and return its code.
async fn close_code(socket: &mut Socket) -> u16 {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for close")
            .expect("socket ended before close")
            .expect("socket error");
        if let Message::Close(frame) = message {
            return frame.map(|f| u16::from(f.code)).unwrap_or(1005);
        }
    }
}

fn attach() -> Value {
    json!({
        "type": "attach",
        "session_id": SID,
        "device_id": "dev-1",
        "device_name": "laptop",
        "cwd": "/home/alice",
    })
}

#[tokio::test]
async fn output_fans_out_to_viewers() {
    let addr = start(Config::default()).await;

    let mut viewers = Vec::new();
    for _ in 0..2 {
        let mut viewer = open(addr, "viewer").await;
        let status = recv(&mut viewer).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["status"], "detached");
        viewers.push(viewer);
    }

    let mut producer = open(addr, "producer").await;
    send(&mut producer, attach()).await;
    let output = json!({"type": "output", "session_id": SID, "data": "bHMK", "timestamp": 1});
    send(&mut producer, output.clone()).await;

    for viewer in &mut viewers {
        let status = recv(viewer).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["status"], "attached");

        let snapshot = recv(viewer).await;
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["sessions"][0]["device_name"], "laptop");

        assert_eq!(recv(viewer).await, output);
    }
}

#[tokio::test]
async fn prompt_reaches_producer_with_web_source() {
    let addr = start(Config::default()).await;
    let mut viewer = open(addr, "viewer").await;
    recv(&mut viewer).await;

    send(
        &mut viewer,
        json!({"type": "prompt", "session_id": SID, "text": "git status"}),
    )
    .await;
    send(
        &mut viewer,
        json!({"type": "resize", "session_id": SID, "cols": 120, "rows": 40}),
    )
    .await;

    // Whether queued or forwarded live, the producer sees both in order.
    let mut producer = open(addr, "producer").await;
    let prompt = recv(&mut producer).await;
    assert_eq!(prompt["type"], "prompt");
    assert_eq!(prompt["text"], "git status");
    assert_eq!(prompt["source"], "web");
    assert!(prompt["timestamp"].as_u64().unwrap() > 0);

    let resize = recv(&mut producer).await;
    assert_eq!(resize, json!({"type": "resize", "session_id": SID, "cols": 120, "rows": 40}));
}

#[tokio::test]
async fn newer_producer_supersedes_older() {
    let addr = start(Config::default()).await;
    let mut viewer = open(addr, "viewer").await;
    recv(&mut viewer).await;

    let mut first = open(addr, "producer").await;
    send(&mut first, attach()).await;
    assert_eq!(recv(&mut viewer).await["status"], "attached");
    recv(&mut viewer).await;

    let mut second = open(addr, "producer").await;
    assert_eq!(close_code(&mut first).await, 4000);

    // The session stays attached through the new producer.
    send(
        &mut second,
        json!({"type": "output", "session_id": SID, "data": "AA==", "timestamp": 2}),
    )
    .await;
    assert_eq!(recv(&mut viewer).await["type"], "output");
}

#[tokio::test]
async fn detach_broadcasts_status() {
    let addr = start(Config::default()).await;
    let mut viewer = open(addr, "viewer").await;
    recv(&mut viewer).await;
    let mut producer = open(addr, "producer").await;

    send(&mut producer, attach()).await;
    recv(&mut viewer).await;
    recv(&mut viewer).await;

    send(&mut producer, json!({"type": "detach", "session_id": SID})).await;
    let status = recv(&mut viewer).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["status"], "detached");
}

#[tokio::test]
async fn foreign_session_and_garbage_get_errors() {
    let addr = start(Config::default()).await;
    let mut viewer = open(addr, "viewer").await;
    recv(&mut viewer).await;

    send(
        &mut viewer,
        json!({"type": "prompt", "session_id": "01HQXK7V8G3N5M2R4P6T1W9Y1A", "text": "x"}),
    )
    .await;
    let error = recv(&mut viewer).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "session_mismatch");

    viewer
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let error = recv(&mut viewer).await;
    assert_eq!(error["code"], "invalid_message");
}

#[tokio::test]
async fn silent_producer_closed_after_timeout() {
    let mut config = Config::default();
    config.session.heartbeat_interval_secs = 1;
    config.session.heartbeat_timeout_secs = 1;
    let addr = start(config).await;

    let mut producer = open(addr, "producer").await;
    send(&mut producer, attach()).await;

    assert_eq!(close_code(&mut producer).await, 4001);
}

#[tokio::test]
async fn missing_token_rejected() {
    let addr = start(Config::default()).await;
    let url = format!("ws://{addr}/sessions/{SID}/viewer");

    match connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        Err(e) => panic!("expected 401, got {e}"),
        Ok(_) => panic!("expected 401, connection accepted"),
    }
}

#[tokio::test]
async fn malformed_session_id_rejected() {
    let addr = start(Config::default()).await;
    let url = format!("ws://{addr}/sessions/not-a-ulid/producer?token={TOKEN}");

    match connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 400);
        }
        Err(e) => panic!("expected 400, got {e}"),
        Ok(_) => panic!("expected 400, connection accepted"),
    }
}

#[tokio::test]
async fn stalled_viewer_is_dropped() {
    let mut config = Config::default();
    config.session.outbound_buffer = 4;
    let addr = start(config).await;

    let mut viewer = open(addr, "viewer").await;
    recv(&mut viewer).await;
    let mut producer = open(addr, "producer").await;
    send(&mut producer, attach()).await;

    // Far more than the socket buffers hold while the viewer is not reading.
    let data = "A".repeat(256 * 1024);
    let sent = 200;
    for n in 0..sent {
        send(
            &mut producer,
            json!({"type": "output", "session_id": SID, "data": data, "timestamp": n}),
        )
        .await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut outputs = 0;
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), viewer.next())
            .await
            .expect("relay kept the stalled viewer open");
        match next {
            Some(Ok(Message::Text(text))) => {
                if text.contains("\"output\"") {
                    outputs += 1;
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }
    assert!(outputs < sent);

    // The producer is unaffected.
    send(&mut producer, json!({"type": "pong"})).await;
}
