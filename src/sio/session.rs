//! Engine.IO session: handshake, transport negotiation and heartbeat.
//!
//! A session always starts with a long-polling handshake, which yields a
//! session id and the transports the server allows. If WebSocket is among
//! them the session probes it (`2probe` / `3probe`) and switches over with
//! an `upgrade` packet; any failure along the way leaves the session on
//! polling.
//!
//! Revision 3 servers expect the client to ping every `pingInterval`.
//! The ping is sent alongside an outstanding read, so a long-poll in flight
//! is never cancelled for it. Revision 4 servers ping instead, and the
//! session answers with a pong.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::CONTENT_TYPE;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::engine::{self, EnginePacket, EngineVersion, OpenPayload, PayloadItem};
use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::BusError;
use crate::subscription::SubProtocol;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// HTTP long-polling transport bound to one session id.
#[derive(Debug)]
struct PollingTransport {
    http: reqwest::Client,
    url: String,
    version: EngineVersion,
}

impl PollingTransport {
    fn request_url(&self) -> String {
        format!("{}&t={}", self.url, Utc::now().timestamp_millis())
    }

    async fn poll(&self) -> Result<Vec<PayloadItem>, BusError> {
        let response = self.http.get(self.request_url()).send().await?;
        let body = read_body(response).await?;
        Ok(engine::decode_payload(self.version, &body))
    }

    async fn send(&self, packets: &[EnginePacket]) -> Result<(), BusError> {
        let body = engine::encode_payload(self.version, packets);
        let response = self
            .http
            .post(self.request_url())
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body)
            .send()
            .await?;
        read_body(response).await.map(drop)
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, BusError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.text().await?);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::BAD_REQUEST {
        // Unknown or expired session id.
        return Err(BusError::Closed(format!("{status}: {}", body.trim())));
    }
    Err(BusError::Transport(format!(
        "unexpected status {status}: {}",
        body.trim()
    )))
}

#[derive(Debug, Clone, Copy)]
struct Heartbeat {
    interval: Duration,
    next_due: Instant,
}

impl Heartbeat {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: Instant::now() + interval,
        }
    }

    fn reset(&mut self) {
        self.next_due = Instant::now() + self.interval;
    }
}

async fn heartbeat_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug)]
enum Transport {
    Polling(PollingTransport),
    WebSocket(Box<WsStream>),
}

/// An established Engine.IO session.
#[derive(Debug)]
pub struct EngineSession {
    version: EngineVersion,
    sid: String,
    transport: Transport,
    pending: VecDeque<PayloadItem>,
    heartbeat: Option<Heartbeat>,
}

impl EngineSession {
    /// Performs the handshake and, when allowed, the WebSocket upgrade.
    ///
    /// The handshake and the upgrade probe are each bounded by
    /// `config.connect_timeout`. A failed upgrade is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connect`], [`BusError::ConnectTimeout`] or
    /// [`BusError::Handshake`] if no session could be opened.
    pub async fn connect(endpoint: &Endpoint, config: &ClientConfig) -> Result<Self, BusError> {
        let version = config.engine_version;
        let base = endpoint.socketio_url();

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| BusError::Connect {
                url: base.clone(),
                reason: err.to_string(),
            })?;

        let handshake_url = format!(
            "{base}?EIO={}&transport=polling&b64=1",
            version.as_query()
        );
        let mut polling = PollingTransport {
            http,
            url: handshake_url.clone(),
            version,
        };

        tracing::debug!(url = %base, eio = version.as_query(), "engine.io handshake");
        let packets = tokio::time::timeout(config.connect_timeout, polling.poll())
            .await
            .map_err(|_| BusError::ConnectTimeout(config.connect_timeout))?
            .map_err(|err| match err {
                BusError::Transport(reason) => BusError::Connect {
                    url: base.clone(),
                    reason,
                },
                other => other,
            })?;

        let mut pending = VecDeque::from(packets);
        let open = match pending.pop_front() {
            Some(Ok(EnginePacket::Open(open))) => open,
            Some(Err(err)) => return Err(BusError::Handshake(err.to_string())),
            _ => {
                return Err(BusError::Handshake(
                    "server did not answer with an open packet".to_string(),
                ));
            }
        };
        tracing::info!(sid = %open.sid, upgrades = ?open.upgrades, ping_interval_ms = open.ping_interval, "engine.io session opened");

        polling.url = format!("{handshake_url}&sid={}", open.sid);
        let heartbeat = (version == EngineVersion::V3)
            .then(|| Heartbeat::new(Duration::from_millis(open.ping_interval)));

        let transport = if config.prefer_websocket && open.offers_websocket() {
            Self::negotiate_upgrade(endpoint, config, &open, polling).await
        } else {
            Transport::Polling(polling)
        };

        let session = Self {
            version,
            sid: open.sid,
            transport,
            pending,
            heartbeat,
        };
        tracing::info!(sid = %session.sid, protocol = %session.protocol(), "transport negotiated");
        Ok(session)
    }

    async fn negotiate_upgrade(
        endpoint: &Endpoint,
        config: &ClientConfig,
        open: &OpenPayload,
        polling: PollingTransport,
    ) -> Transport {
        let url = format!(
            "{}?EIO={}&transport=websocket&sid={}",
            endpoint.socketio_ws_url(),
            config.engine_version.as_query(),
            open.sid
        );
        match tokio::time::timeout(config.connect_timeout, probe_upgrade(&url)).await {
            Ok(Ok(stream)) => Transport::WebSocket(Box::new(stream)),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "websocket upgrade failed, staying on polling");
                Transport::Polling(polling)
            }
            Err(_) => {
                tracing::warn!(timeout = ?config.connect_timeout, "websocket upgrade timed out, staying on polling");
                Transport::Polling(polling)
            }
        }
    }

    /// Engine.IO revision spoken by this session.
    #[must_use]
    pub const fn version(&self) -> EngineVersion {
        self.version
    }

    /// Session id assigned by the server.
    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Transport the session ended up on.
    #[must_use]
    pub const fn protocol(&self) -> SubProtocol {
        match self.transport {
            Transport::Polling(_) => SubProtocol::SocketIoPolling,
            Transport::WebSocket(_) => SubProtocol::SocketIoWebSocket,
        }
    }

    /// Sends one packet.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] if the packet cannot be sent as text
    /// or the transport fails.
    pub async fn send(&mut self, packet: EnginePacket) -> Result<(), BusError> {
        let Some(text) = packet.encode() else {
            return Err(BusError::Transport(format!(
                "cannot send {} packet",
                packet.kind_str()
            )));
        };
        match &mut self.transport {
            Transport::Polling(polling) => polling.send(std::slice::from_ref(&packet)).await,
            Transport::WebSocket(stream) => {
                stream.send(Message::text(text)).await?;
                Ok(())
            }
        }
    }

    /// Receives the next application packet (`message` or binary data).
    ///
    /// Heartbeat and other control packets are handled here and reported as
    /// [`BusError::NoData`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoData`] when no application packet is available
    /// yet, [`BusError::Closed`] when the server closes the session, a
    /// decode error for a malformed payload, or a transport error.
    pub async fn recv(&mut self) -> Result<EnginePacket, BusError> {
        let packet = match self.pending.pop_front() {
            Some(item) => item?,
            None => self.read_transport().await?,
        };
        match packet {
            EnginePacket::Ping(data) => {
                tracing::debug!("heartbeat ping from server");
                if self.version == EngineVersion::V4 {
                    self.send(EnginePacket::Pong(data)).await?;
                }
                Err(BusError::NoData)
            }
            EnginePacket::Close => Err(BusError::Closed("engine.io session closed".to_string())),
            EnginePacket::Message(_) | EnginePacket::Binary(_) => Ok(packet),
            other => {
                tracing::debug!(packet = other.kind_str(), "control packet");
                Err(BusError::NoData)
            }
        }
    }

    async fn read_transport(&mut self) -> Result<EnginePacket, BusError> {
        match &mut self.transport {
            Transport::Polling(polling) => {
                let mut batch = poll_with_heartbeat(polling, &mut self.heartbeat)
                    .await?
                    .into_iter();
                let first = batch.next().ok_or(BusError::NoData)?;
                self.pending.extend(batch);
                Ok(first?)
            }
            Transport::WebSocket(stream) => read_ws(stream, &mut self.heartbeat).await,
        }
    }
}

async fn probe_upgrade(url: &str) -> Result<WsStream, BusError> {
    let (mut stream, _response) = connect_async(url).await.map_err(|err| BusError::Connect {
        url: url.to_string(),
        reason: err.to_string(),
    })?;

    stream.send(Message::text("2probe")).await?;
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if engine::decode_packet(text.as_str())? == EnginePacket::Pong("probe".to_string()) {
                    break;
                }
                return Err(BusError::Handshake(format!(
                    "unexpected upgrade probe reply '{}'",
                    text.as_str()
                )));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(BusError::Closed("closed during upgrade probe".to_string()));
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
        }
    }
    stream.send(Message::text("5")).await?;
    Ok(stream)
}

async fn poll_with_heartbeat(
    polling: &PollingTransport,
    heartbeat: &mut Option<Heartbeat>,
) -> Result<Vec<PayloadItem>, BusError> {
    let request = polling.poll();
    tokio::pin!(request);
    loop {
        tokio::select! {
            result = &mut request => return result,
            () = heartbeat_due(heartbeat.map(|hb| hb.next_due)) => {
                tracing::debug!("sending heartbeat ping");
                polling.send(&[EnginePacket::Ping(String::new())]).await?;
                if let Some(hb) = heartbeat.as_mut() {
                    hb.reset();
                }
            }
        }
    }
}

async fn read_ws(
    stream: &mut WsStream,
    heartbeat: &mut Option<Heartbeat>,
) -> Result<EnginePacket, BusError> {
    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => return Ok(engine::decode_packet(text.as_str())?),
                Some(Ok(Message::Binary(bytes))) => return Ok(EnginePacket::Binary(bytes.to_vec())),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(BusError::Closed("websocket closed".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            },
            () = heartbeat_due(heartbeat.map(|hb| hb.next_due)) => {
                tracing::debug!("sending heartbeat ping");
                stream.send(Message::text("2")).await?;
                if let Some(hb) = heartbeat.as_mut() {
                    hb.reset();
                }
                return Err(BusError::NoData);
            }
        }
    }
}
