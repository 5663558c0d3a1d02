//! Raw WebSocket transport reader.
//!
//! Holds one WebSocket connection to a per-entity bus endpoint and yields
//! each text or binary message as one [`RawFrame`]. The bus sends one JSON
//! document per frame; no reassembly is attempted.
//!
//! Any read failure, including a close from the peer, ends the session.
//! There is no reconnect.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};

use crate::config::ClientConfig;
use crate::domain::{EntityKind, SubscriptionTarget};
use crate::endpoint::Endpoint;
use crate::error::BusError;
use crate::subscription::{Frame, FrameSource, RawFrame, SubProtocol};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single raw WebSocket session.
#[derive(Debug)]
pub struct RawConnection {
    kind: EntityKind,
    buffer_size: usize,
    stream: WsStream,
}

impl RawConnection {
    /// Dials the subscription endpoint for `target`.
    ///
    /// Only the dial and WebSocket handshake are bounded by
    /// `config.connect_timeout`; reads afterwards wait indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectTimeout`] or [`BusError::Connect`] if the
    /// connection cannot be established.
    pub async fn connect(
        endpoint: &Endpoint,
        target: &SubscriptionTarget,
        config: &ClientConfig,
    ) -> Result<Self, BusError> {
        let url = endpoint.subscription_url(target);
        tracing::debug!(%url, "dialing raw websocket");

        // The session buffer is the only size limit; larger frames are
        // dropped by the decoder instead of failing the read.
        let ws_config = WebSocketConfig::default()
            .max_message_size(None)
            .max_frame_size(None);
        let dial = connect_async_with_config(url.as_str(), Some(ws_config), false);
        let (stream, _response) = tokio::time::timeout(config.connect_timeout, dial)
            .await
            .map_err(|_| BusError::ConnectTimeout(config.connect_timeout))?
            .map_err(|err| BusError::Connect {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        tracing::info!(%url, buffer_size = target.buffer_size(), "subscribed via websocket");

        Ok(Self {
            kind: target.entity_kind(),
            buffer_size: target.buffer_size(),
            stream,
        })
    }
}

impl FrameSource for RawConnection {
    async fn next_frame(&mut self) -> Result<Option<Frame>, BusError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Raw(RawFrame::read(
                        self.kind,
                        text.as_bytes(),
                        self.buffer_size,
                    ))));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(Frame::Raw(RawFrame::read(
                        self.kind,
                        &bytes,
                        self.buffer_size,
                    ))));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "close frame without reason".to_string(),
                        |f| format!("{} {}", f.code, f.reason),
                    );
                    return Err(BusError::Closed(reason));
                }
                // Control frames; pongs are queued by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => return Err(BusError::Closed("stream ended".to_string())),
            }
        }
    }

    fn protocol(&self) -> SubProtocol {
        SubProtocol::RawWebSocket
    }
}
