//! Socket.IO subscriptions against an in-process mock Engine.IO server.

#![allow(clippy::panic, clippy::indexing_slicing)]

mod common;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bus_tap::domain::BusMessage;
use bus_tap::endpoint::Endpoint;
use bus_tap::sink::ChannelSink;
use bus_tap::sio::SocketIoClient;
use bus_tap::sio::engine::EngineVersion;
use bus_tap::subscription::{FrameSource, SubProtocol, Subscription};
use bus_tap::{BusClient, BusError};
use serde_json::json;
use tokio::sync::Mutex;

const V3_OPEN_POLLING_ONLY: &str =
    r#"0{"sid":"s3","upgrades":[],"pingInterval":25000,"pingTimeout":60000}"#;
const V4_OPEN_WITH_UPGRADE: &str = r#"0{"sid":"s4","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

#[derive(Clone)]
struct EngineBus {
    version: EngineVersion,
    /// Body returned for the handshake request (no `sid` yet).
    handshake: String,
    /// Bodies returned by successive polls, then `idle` forever.
    polls: Arc<Mutex<VecDeque<String>>>,
    idle: String,
    /// Delay before answering each poll.
    poll_delay: Duration,
    accept_upgrade: bool,
    /// Query strings of every GET.
    gets: Arc<Mutex<Vec<HashMap<String, String>>>>,
    /// Bodies of every POST, plus text frames received after an upgrade.
    received: Arc<Mutex<Vec<String>>>,
}

impl EngineBus {
    fn new(version: EngineVersion, open: &str, polls: Vec<String>) -> Self {
        let (handshake, idle) = match version {
            EngineVersion::V3 => (common::v3_payload(&[open]), common::v3_payload(&["6"])),
            EngineVersion::V4 => (open.to_string(), "6".to_string()),
        };
        Self {
            version,
            handshake,
            polls: Arc::new(Mutex::new(polls.into())),
            idle,
            poll_delay: Duration::ZERO,
            accept_upgrade: false,
            gets: Arc::default(),
            received: Arc::default(),
        }
    }
}

async fn engine_get(
    State(bus): State<EngineBus>,
    Query(query): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    bus.gets.lock().await.push(query.clone());

    if query.get("transport").map(String::as_str) == Some("websocket") {
        return match ws {
            Ok(ws) if bus.accept_upgrade => ws
                .on_upgrade(move |socket| serve_upgraded(socket, bus))
                .into_response(),
            _ => (StatusCode::BAD_REQUEST, "upgrade refused").into_response(),
        };
    }

    if !query.contains_key("sid") {
        return bus.handshake.clone().into_response();
    }

    tokio::time::sleep(bus.poll_delay).await;
    let next = bus.polls.lock().await.pop_front();
    match next {
        Some(body) => body.into_response(),
        None => {
            tokio::time::sleep(Duration::from_millis(50)).await;
            bus.idle.clone().into_response()
        }
    }
}

async fn engine_post(State(bus): State<EngineBus>, body: String) -> &'static str {
    bus.received.lock().await.push(body);
    "ok"
}

async fn next_text(socket: &mut WebSocket) -> Option<String> {
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message {
            return Some(text.as_str().to_owned());
        }
    }
    None
}

/// Answers the upgrade probe, then runs the script for the session's
/// revision.
async fn serve_upgraded(mut socket: WebSocket, bus: EngineBus) {
    if next_text(&mut socket).await.as_deref() != Some("2probe") {
        return;
    }
    let _ = socket.send(Message::text("3probe")).await;
    if next_text(&mut socket).await.as_deref() != Some("5") {
        return;
    }
    match bus.version {
        EngineVersion::V3 => serve_v3_upgraded(socket, bus).await,
        EngineVersion::V4 => serve_v4_upgraded(socket, bus).await,
    }
}

/// Namespace ack, then records whatever the client sends for a while
/// (heartbeat pings), then three events and a close.
async fn serve_v3_upgraded(mut socket: WebSocket, bus: EngineBus) {
    let _ = socket.send(Message::text("40")).await;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(250);
    while let Ok(Some(text)) = tokio::time::timeout_at(deadline, next_text(&mut socket)).await {
        bus.received.lock().await.push(text);
    }

    for frame in [r#"42["a",{"n":1}]"#, r#"42["b",{"n":2}]"#, r#"42["c",{"n":3}]"#, "1"] {
        if socket.send(Message::text(frame)).await.is_err() {
            return;
        }
    }
    let _ = next_text(&mut socket).await;
}

/// Namespace connect, one server ping, three events, close.
async fn serve_v4_upgraded(mut socket: WebSocket, bus: EngineBus) {
    let Some(connect) = next_text(&mut socket).await else {
        return;
    };
    bus.received.lock().await.push(connect);
    let _ = socket.send(Message::text(r#"40{"sid":"nsp-1"}"#)).await;

    let _ = socket.send(Message::text("2")).await;
    let Some(pong) = next_text(&mut socket).await else {
        return;
    };
    bus.received.lock().await.push(pong);

    for frame in [
        r#"42["a",{"n":1}]"#,
        r#"42["b",{"n":2}]"#,
        r#"42["b""#,
        r#"42["c",{"n":3}]"#,
        "1",
    ] {
        if socket.send(Message::text(frame)).await.is_err() {
            return;
        }
    }
    let _ = next_text(&mut socket).await;
}

fn router(bus: EngineBus) -> Router {
    Router::new()
        .route(
            "/v2/message_bus/socket.io/",
            get(engine_get).post(engine_post),
        )
        .with_state(bus)
}

async fn connect(addr: std::net::SocketAddr, version: EngineVersion) -> SocketIoClient {
    let config = common::config(addr, version);
    let Ok(endpoint) = Endpoint::new(&config.root_url, &config.base_path) else {
        panic!("mock address rejected");
    };
    match SocketIoClient::connect(&endpoint, &config, "/").await {
        Ok(client) => client,
        Err(err) => panic!("socketio connect failed: {err}"),
    }
}

#[tokio::test]
async fn v3_polling_session_dispatches_events_in_order() {
    let bus = EngineBus::new(
        EngineVersion::V3,
        V3_OPEN_POLLING_ONLY,
        vec![
            common::v3_payload(&["40"]),
            common::v3_payload(&["6"]),
            common::v3_payload(&[r#"42["a",{"n":1}]"#, r#"42["b",{"n":2}]"#]),
            common::v3_payload(&[r#"42["c",{"n":3}]"#, r#"42["bad""#, "1"]),
        ],
    );
    let gets = Arc::clone(&bus.gets);
    let received = Arc::clone(&bus.received);
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V3).await;
    assert_eq!(client.protocol(), SubProtocol::SocketIoPolling);

    let (sink, mut rx) = ChannelSink::new();
    let mut subscription = Subscription::new(client, sink, Duration::from_millis(10));
    let result = subscription.run().await;

    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    let messages = common::drain(&mut rx);
    assert_eq!(common::names(&messages), vec!["a", "b", "c"]);
    assert_eq!(subscription.stats().dispatched, 3);
    assert_eq!(subscription.stats().skipped, 1);

    let BusMessage::Multiplexed(first) = &messages[0] else {
        panic!("expected a multiplexed message");
    };
    assert_eq!(first.namespace, "/");
    assert_eq!(first.payloads[0].get("n"), Some(&json!(1)));

    let gets = gets.lock().await;
    assert!(gets.iter().all(|q| q.get("EIO").map(String::as_str) == Some("3")));
    assert!(gets.iter().all(|q| q.get("b64").map(String::as_str) == Some("1")));
    assert!(gets.iter().skip(1).all(|q| q.get("sid").map(String::as_str) == Some("s3")));
    assert!(received.lock().await.is_empty(), "revision 3 joins '/' implicitly");
}

#[tokio::test]
async fn v4_session_upgrades_to_websocket_and_answers_pings() {
    let mut bus = EngineBus::new(EngineVersion::V4, V4_OPEN_WITH_UPGRADE, Vec::new());
    bus.accept_upgrade = true;
    let received = Arc::clone(&bus.received);
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V4).await;
    assert_eq!(client.protocol(), SubProtocol::SocketIoWebSocket);
    assert_eq!(client.namespace(), "/");

    let (sink, mut rx) = ChannelSink::new();
    let mut subscription = Subscription::new(client, sink, Duration::from_millis(10));
    let result = tokio::time::timeout(Duration::from_secs(10), subscription.run()).await;

    let Ok(result) = result else {
        panic!("subscription did not end");
    };
    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert_eq!(common::names(&common::drain(&mut rx)), vec!["a", "b", "c"]);
    assert_eq!(*received.lock().await, vec!["40".to_string(), "3".to_string()]);
}

#[tokio::test]
async fn refused_upgrade_falls_back_to_polling() {
    let bus = EngineBus::new(
        EngineVersion::V4,
        V4_OPEN_WITH_UPGRADE,
        vec![
            r#"40{"sid":"nsp-1"}"#.to_string(),
            "2".to_string(),
            format!("{}\u{1e}{}", r#"42["a",{}]"#, r#"42["b",{"ok":true}]"#),
            "1".to_string(),
        ],
    );
    let gets = Arc::clone(&bus.gets);
    let received = Arc::clone(&bus.received);
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V4).await;
    assert_eq!(client.protocol(), SubProtocol::SocketIoPolling);

    let (sink, mut rx) = ChannelSink::new();
    let result = Subscription::new(client, sink, Duration::from_millis(10))
        .run()
        .await;

    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert_eq!(common::names(&common::drain(&mut rx)), vec!["a", "b"]);
    assert_eq!(*received.lock().await, vec!["40".to_string(), "3".to_string()]);
    assert!(
        gets.lock()
            .await
            .iter()
            .any(|q| q.get("transport").map(String::as_str) == Some("websocket")),
        "upgrade was attempted"
    );
}

#[tokio::test]
async fn v3_polling_sends_heartbeat_while_poll_is_outstanding() {
    let mut bus = EngineBus::new(
        EngineVersion::V3,
        r#"0{"sid":"hb","upgrades":[],"pingInterval":40,"pingTimeout":60000}"#,
        vec![common::v3_payload(&["6"]), common::v3_payload(&["1"])],
    );
    bus.poll_delay = Duration::from_millis(150);
    let received = Arc::clone(&bus.received);
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V3).await;
    let (sink, mut rx) = ChannelSink::new();
    let result = Subscription::new(client, sink, Duration::from_millis(10))
        .run()
        .await;

    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert!(common::drain(&mut rx).is_empty());
    let pings = received
        .lock()
        .await
        .iter()
        .filter(|body| body.as_str() == "1:2")
        .count();
    assert!(pings >= 2, "expected heartbeat pings, got {pings}");
}

#[tokio::test]
async fn namespace_disconnect_ends_the_session() {
    let bus = EngineBus::new(
        EngineVersion::V4,
        r#"0{"sid":"d","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#,
        vec![r#"40{"sid":"nsp-1"}"#.to_string(), r#"42["a",{}]"#.to_string(), "41".to_string()],
    );
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;
    let Ok(client) = BusClient::new(common::config(addr, EngineVersion::V4)) else {
        panic!("client rejected mock address");
    };

    let (sink, mut rx) = ChannelSink::new();
    let result = client.subscribe_multiplexed("/", sink).await;

    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert_eq!(common::names(&common::drain(&mut rx)), vec!["a"]);
}

#[tokio::test]
async fn handshake_without_open_packet_is_rejected() {
    let bus = EngineBus::new(EngineVersion::V4, "6", Vec::new());
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;
    let Ok(client) = BusClient::new(common::config(addr, EngineVersion::V4)) else {
        panic!("client rejected mock address");
    };

    let (sink, _rx) = ChannelSink::new();
    let result = client.subscribe_multiplexed("/", sink).await;
    assert!(matches!(result, Err(BusError::Handshake(_))), "{result:?}");
}

#[tokio::test]
async fn malformed_packet_in_a_polling_batch_drops_only_itself() {
    let bus = EngineBus::new(
        EngineVersion::V4,
        r#"0{"sid":"m4","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#,
        vec![
            r#"40{"sid":"nsp-1"}"#.to_string(),
            format!("{}\u{1e}9\u{1e}{}", r#"42["a",{}]"#, r#"42["b",{}]"#),
            "1".to_string(),
        ],
    );
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V4).await;
    let (sink, mut rx) = ChannelSink::new();
    let mut subscription = Subscription::new(client, sink, Duration::from_millis(10));
    let result = subscription.run().await;

    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert_eq!(common::names(&common::drain(&mut rx)), vec!["a", "b"]);
    assert_eq!(subscription.stats().dispatched, 2);
    assert_eq!(subscription.stats().skipped, 1);
}

#[tokio::test]
async fn v3_packet_with_unknown_type_keeps_the_rest_of_the_batch() {
    let bus = EngineBus::new(
        EngineVersion::V3,
        V3_OPEN_POLLING_ONLY,
        vec![
            common::v3_payload(&[r#"42["a",{}]"#, "9", r#"42["b",{}]"#, "1"]),
        ],
    );
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V3).await;
    let (sink, mut rx) = ChannelSink::new();
    let result = Subscription::new(client, sink, Duration::from_millis(10))
        .run()
        .await;

    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert_eq!(common::names(&common::drain(&mut rx)), vec!["a", "b"]);
}

#[tokio::test]
async fn v3_session_upgrades_and_pings_over_websocket() {
    let mut bus = EngineBus::new(
        EngineVersion::V3,
        r#"0{"sid":"w3","upgrades":["websocket"],"pingInterval":40,"pingTimeout":60000}"#,
        Vec::new(),
    );
    bus.accept_upgrade = true;
    let received = Arc::clone(&bus.received);
    let (addr, _shutdown) = common::spawn_server(router(bus)).await;

    let client = connect(addr, EngineVersion::V3).await;
    assert_eq!(client.protocol(), SubProtocol::SocketIoWebSocket);

    let (sink, mut rx) = ChannelSink::new();
    let mut subscription = Subscription::new(client, sink, Duration::from_millis(10));
    let result = tokio::time::timeout(Duration::from_secs(10), subscription.run()).await;

    let Ok(result) = result else {
        panic!("subscription did not end");
    };
    assert!(matches!(result, Err(BusError::Closed(_))), "{result:?}");
    assert_eq!(common::names(&common::drain(&mut rx)), vec!["a", "b", "c"]);

    let received = received.lock().await;
    let pings = received.iter().filter(|frame| frame.as_str() == "2").count();
    assert!(pings >= 2, "expected heartbeat pings, got {received:?}");
    assert!(
        received.iter().all(|frame| frame.as_str() == "2"),
        "revision 3 sends no namespace connect for '/': {received:?}"
    );
}
