//! End-to-end tests for the signal server
//!
//! Starts a real server on an ephemeral port and drives it with WebSocket
//! clients and raw HTTP requests.
//!
//! Run: `cargo test -p huddle-signal --test relay_e2e`

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};

use huddle_core::Config;
use huddle_signal::{Registry, SignalServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn config() -> Config {
    let mut config = Config::default();
    config.auth.login = Some("letmein".into());
    config.server.static_dir = std::env::temp_dir().join("huddle-e2e-missing");
    config
}

async fn start_with(config: Config) -> (SocketAddr, SignalServer) {
    let server = SignalServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = server.clone();
    tokio::spawn(async move { serving.serve_on(listener).await });
    (addr, server)
}

async fn start_server() -> SocketAddr {
    start_with(config()).await.0
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

/// One request on a fresh connection; returns status code and body
async fn http_request(addr: SocketAddr, target: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        target
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn http_get(addr: SocketAddr, target: &str) -> String {
    http_request(addr, target).await.1
}

/// Poll an HTTP counter until it reports `expected`
async fn wait_for(addr: SocketAddr, target: &str, expected: &str) {
    for _ in 0..200 {
        if http_get(addr, target).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reported {}", target, expected);
}

/// Poll the registry until it holds `expected` peers
async fn wait_for_peers(registry: &Registry, expected: usize, within: Duration) {
    let deadline = tokio::time::Instant::now() + within;
    while registry.count_all() != expected {
        if tokio::time::Instant::now() > deadline {
            panic!("registry holds {} peers, expected {}", registry.count_all(), expected);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_json(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
        .unwrap();
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

async fn assert_silent(client: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "expected no frame, got {:?}", next);
}

#[tokio::test(flavor = "multi_thread")]
async fn presence_and_relay_scenarios() {
    let addr = start_server().await;

    // Scenario 1: three peers register
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut c = connect(addr).await;
    wait_for(addr, "/count", "3").await;
    assert_eq!(http_get(addr, "/active").await, "0");

    // Scenario 5: an offer reaches everyone but its sender
    let offer = json!({"offer": {"type": "offer", "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"}});
    send_json(&mut a, offer.clone()).await;
    assert_eq!(recv_json(&mut b).await, offer);
    assert_eq!(recv_json(&mut c).await, offer);
    assert_silent(&mut a).await;

    // Scenario 2: A starts a call (twice), B leaves without one
    send_json(&mut a, json!({"action": "call_started"})).await;
    send_json(&mut a, json!({"action": "call_started"})).await;
    wait_for(addr, "/active", "1").await;

    b.close(None).await.unwrap();
    wait_for(addr, "/count", "2").await;
    assert_eq!(http_get(addr, "/active").await, "1");

    // Scenario 3: A leaves while in a call
    drop(a);
    wait_for(addr, "/count", "1").await;
    assert_eq!(http_get(addr, "/active").await, "0");

    // Scenario 4: ending a call that never started
    send_json(&mut c, json!({"action": "call_ended"})).await;
    send_json(&mut c, json!({"candidate": {"candidate": "x"}})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(http_get(addr, "/active").await, "0");
    assert_eq!(http_get(addr, "/count").await, "1");
}

#[tokio::test(flavor = "multi_thread")]
async fn call_markers_are_not_relayed() {
    let addr = start_server().await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for(addr, "/count", "2").await;

    send_json(&mut a, json!({"action": "call_started"})).await;
    send_json(&mut a, json!({"action": "hangup", "answer": {"sdp": "v=0"}, "room": 7})).await;

    // only the unrecognised action arrives, with unknown fields dropped
    assert_eq!(
        recv_json(&mut b).await,
        json!({"action": "hangup", "answer": {"sdp": "v=0"}})
    );
    assert_silent(&mut b).await;
    assert_eq!(http_get(addr, "/active").await, "1");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_frame_disconnects_only_sender() {
    let addr = start_server().await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    send_json(&mut a, json!({"action": "call_started"})).await;
    wait_for(addr, "/active", "1").await;
    wait_for(addr, "/count", "2").await;

    a.send(Message::Text("{not json".into())).await.unwrap();
    wait_for(addr, "/count", "1").await;
    assert_eq!(http_get(addr, "/active").await, "0");

    // the survivor keeps working
    let mut c = connect(addr).await;
    wait_for(addr, "/count", "2").await;
    send_json(&mut b, json!({"answer": {"sdp": "ok"}})).await;
    assert_eq!(recv_json(&mut c).await, json!({"answer": {"sdp": "ok"}}));
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_reader_is_disconnected_after_send_timeout() {
    let mut config = config();
    config.relay.send_timeout_ms = 200;
    config.relay.outbound_queue = 256;
    let (addr, server) = start_with(config).await;

    let mut a = connect(addr).await;
    // never read from `stalled`; its socket buffers fill up
    let stalled = connect(addr).await;
    wait_for_peers(server.registry(), 2, Duration::from_secs(2)).await;

    // far more than loopback socket buffers hold
    let candidate = "x".repeat(512 * 1024);
    for _ in 0..64 {
        send_json(&mut a, json!({"candidate": candidate})).await;
    }

    wait_for_peers(server.registry(), 1, Duration::from_secs(10)).await;
    assert_eq!(server.registry().count_active(), 0);

    // the sender is unaffected
    let mut c = connect(addr).await;
    wait_for_peers(server.registry(), 2, Duration::from_secs(2)).await;
    send_json(&mut a, json!({"answer": {"sdp": "still here"}})).await;
    assert_eq!(recv_json(&mut c).await, json!({"answer": {"sdp": "still here"}}));
    drop(stalled);
}

#[tokio::test(flavor = "multi_thread")]
async fn relays_over_tls() {
    let dir = tempfile::tempdir().unwrap();
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    let cert_path = dir.path().join("fullchain.pem");
    let key_path = dir.path().join("privkey.pem");
    std::fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
    std::fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();

    let mut config = config();
    config.tls.cert_path = Some(cert_path);
    config.tls.key_path = Some(key_path);
    let (addr, server) = start_with(config).await;

    let url = format!("wss://localhost:{}/ws", addr.port());
    let mut clients = Vec::new();
    for _ in 0..2 {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap();
        let (ws, _) = connect_async_tls_with_config(
            url.as_str(),
            None,
            false,
            Some(Connector::NativeTls(connector)),
        )
        .await
        .unwrap();
        clients.push(ws);
    }
    let (mut a, mut b) = (clients.remove(0), clients.remove(0));
    wait_for_peers(server.registry(), 2, Duration::from_secs(2)).await;

    send_json(&mut a, json!({"action": "call_started"})).await;
    send_json(&mut a, json!({"offer": {"type": "offer", "sdp": "v=0"}})).await;
    assert_eq!(
        recv_json(&mut b).await,
        json!({"offer": {"type": "offer", "sdp": "v=0"}})
    );
    assert_eq!(server.registry().count_active(), 1);

    a.close(None).await.unwrap();
    wait_for_peers(server.registry(), 1, Duration::from_secs(2)).await;
    assert_eq!(server.registry().count_active(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn http_endpoints() {
    let addr = start_server().await;

    assert_eq!(http_get(addr, "/checkUser?login=letmein").await, "Ok");
    assert_eq!(http_get(addr, "/checkUser?login=wrong").await, "Failed");

    let health: Value = serde_json::from_str(&http_get(addr, "/health").await).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["peers"], 0);

    let (status, _) = http_request(addr, "/ws").await;
    assert_eq!(status, 400);
    assert_eq!(http_request(addr, "/index.html").await.0, 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn static_assets_are_served() {
    let dir = tempfile::tempdir().unwrap();
    write_asset(dir.path(), "index.html", "<title>huddle</title>");
    write_asset(dir.path(), "my file.js", "connect();");

    let mut config = config();
    config.server.static_dir = dir.path().to_path_buf();
    let (addr, _server) = start_with(config).await;

    assert_eq!(
        http_request(addr, "/").await,
        (200, "<title>huddle</title>".to_string())
    );
    assert_eq!(
        http_request(addr, "/my%20file.js").await,
        (200, "connect();".to_string())
    );
    assert_eq!(http_request(addr, "/../etc/passwd").await.0, 404);
}

fn write_asset(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}
