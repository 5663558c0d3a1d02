//! Shared helpers for the mock message bus.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use bus_tap::config::ClientConfig;
use bus_tap::domain::BusMessage;
use bus_tap::sio::engine::EngineVersion;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

/// Base path every mock route lives under.
pub const BASE_PATH: &str = "v2/message_bus";

/// Binds `app` on an ephemeral port and serves it until the returned
/// sender is dropped or fired.
pub async fn spawn_server(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind mock server listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("read mock server listener address");
    };
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
    });
    (addr, shutdown_tx)
}

/// Client configuration pointing at a mock server.
pub fn config(addr: SocketAddr, version: EngineVersion) -> ClientConfig {
    ClientConfig {
        root_url: addr.to_string(),
        base_path: BASE_PATH.to_string(),
        connect_timeout: Duration::from_secs(5),
        idle_retry_interval: Duration::from_millis(10),
        engine_version: version,
        prefer_websocket: true,
    }
}

/// Drains everything currently queued on a channel sink's receiver.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<BusMessage>) -> Vec<BusMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

/// Event names of multiplexed messages, or record names of raw ones.
pub fn names(messages: &[BusMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            BusMessage::Record { record, .. } => Some(record.name.clone()),
            BusMessage::Multiplexed(m) => m.event.clone(),
        })
        .collect()
}

/// Frames packets as an Engine.IO revision 3 polling body.
pub fn v3_payload(packets: &[&str]) -> String {
    packets
        .iter()
        .map(|p| format!("{}:{p}", p.chars().count()))
        .collect()
}
