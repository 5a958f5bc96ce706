//! Black-box WebSocket session tests — drives a bound gateway over real
//! frames, mirroring the teacher's own `tests/health.rs`/`integration_test.rs`
//! style (spin up on a random port, connect with a real client, assert on
//! the wire).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use meshgate::config::GatewayConfig;
use meshgate::AppState;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_gateway() -> (u16, std::sync::Arc<AppState>) {
    let port = find_free_port();
    let root = tempfile::tempdir().unwrap().into_path();
    let config = GatewayConfig::new(Some(port), Some(root), Some("error".to_string()));
    let state = AppState::new(config);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let app = meshgate::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, state)
}

async fn connect(port: u16, path: &str) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("ws://127.0.0.1:{port}{path}");
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

/// S1: subscribe with `iter=OLDEST`, `scheduler=IMMEDIATE`; producer
/// publishes three packets before the client ever connects — all three
/// must replay, in order.
#[tokio::test]
async fn s1_oldest_immediate_replays_full_history_in_order() {
    let (port, state) = spawn_gateway().await;
    let topic = state.process.mesh.pubsub.get_or_create("t").await;
    topic.publish(vec![], b"a".to_vec()).await;
    topic.publish(vec![], b"b".to_vec()).await;
    topic.publish(vec![], b"c".to_vec()).await;

    let mut ws = connect(port, "/wsapi/sub").await;
    ws.send(Message::Text(
        json!({"topic":"t","init":"OLDEST","iter":"NEXT","scheduler":"IMMEDIATE"}).to_string().into(),
    ))
    .await
    .unwrap();

    for expected in ["a", "b", "c"] {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else { panic!("expected text frame") };
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["payload"], expected);
    }
}

/// S2: under `ON_ACK`, a non-`"ACK"` text frame after handshake is a
/// protocol error that closes the socket with code 4000.
#[tokio::test]
async fn s2_on_ack_rejects_non_ack_text_with_4000() {
    let (port, state) = spawn_gateway().await;
    let topic = state.process.mesh.pubsub.get_or_create("t").await;
    topic.publish(vec![], b"a".to_vec()).await;

    let mut ws = connect(port, "/wsapi/sub").await;
    ws.send(Message::Text(
        json!({"topic":"t","init":"OLDEST","scheduler":"ON_ACK"}).to_string().into(),
    ))
    .await
    .unwrap();

    // First frame arrives and the producer then waits for an ACK.
    let _first = tokio::time::timeout(Duration::from_secs(2), ws.next()).await.unwrap().unwrap();

    ws.send(Message::Text("nope".into())).await.unwrap();

    let close = loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => continue,
            other => panic!("expected a close frame, got {other:?}"),
        }
    };
    assert_eq!(close.unwrap().code, 4000u16.into());
}

/// S3: numeric `init` filters history below the given sequence.
#[tokio::test]
async fn s3_numeric_init_filters_history_below_seq_min() {
    let (port, state) = spawn_gateway().await;
    let topic = state.process.mesh.pubsub.get_or_create("t").await;
    for p in ["a", "b", "c", "d", "e"] {
        topic.publish(vec![], p.as_bytes().to_vec()).await;
    }

    let mut ws = connect(port, "/wsapi/sub").await;
    ws.send(Message::Text(
        json!({"topic":"t","init":3,"iter":"NEXT","scheduler":"IMMEDIATE"}).to_string().into(),
    ))
    .await
    .unwrap();

    for expected in ["d", "e"] {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else { panic!("expected text frame") };
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["payload"], expected);
    }
}

/// A malformed handshake closes with 4000 and never streams anything.
#[tokio::test]
async fn malformed_handshake_closes_with_4000() {
    let (port, _state) = spawn_gateway().await;
    let mut ws = connect(port, "/wsapi/sub").await;
    ws.send(Message::Text("not json".into())).await.unwrap();

    let close = loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => continue,
            other => panic!("expected a close frame, got {other:?}"),
        }
    };
    assert_eq!(close.unwrap().code, 4000u16.into());
}

/// `/healthz` reports an active connection while a stream is open.
#[tokio::test]
async fn healthz_reports_active_connection_count() {
    let (port, _state) = spawn_gateway().await;
    let mut ws = connect(port, "/wsapi/sub").await;
    ws.send(Message::Text(json!({"topic":"t"}).to_string().into())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let body = reqwest_health(port).await;
    assert_eq!(body["status"], "ok");
    assert!(body["active_connections"].as_u64().unwrap() >= 1);
}

async fn reqwest_health(port: u16) -> Value {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8_lossy(&buf);
    let body = text.split("\r\n\r\n").nth(1).unwrap_or("");
    serde_json::from_str(body).unwrap()
}
