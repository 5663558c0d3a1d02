//! The subscription loop shared by both transports.
//!
//! A transport implements [`FrameSource`]; a consumer implements
//! [`RecordSink`]. [`Subscription::run`] connects the two with one
//! sequential loop: read a frame, decode it, dispatch it, and route every
//! failure through [`classify`].

use std::future::Future;
use std::time::Duration;

use crate::decode;
use crate::domain::EntityKind;
use crate::error::{BusError, Disposition, classify};
use crate::sink::RecordSink;
use crate::sio::packet::Packet;

/// Wire protocol negotiated for a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProtocol {
    /// Bare WebSocket, one JSON document per frame.
    RawWebSocket,
    /// Socket.IO over an upgraded Engine.IO WebSocket.
    SocketIoWebSocket,
    /// Socket.IO over Engine.IO HTTP long-polling.
    SocketIoPolling,
}

impl std::fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::RawWebSocket => "websocket",
            Self::SocketIoWebSocket => "socketio/websocket",
            Self::SocketIoPolling => "socketio/polling",
        })
    }
}

/// One raw WebSocket message as read into the session buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Entity kind of the subscription.
    pub kind: EntityKind,
    /// Bytes that fit in the read buffer.
    pub payload: Vec<u8>,
    /// Size of the message on the wire. Larger than `payload.len()` when
    /// the message did not fit.
    pub wire_len: usize,
}

impl RawFrame {
    /// Reads `message` into a buffer of `buffer_size` bytes.
    #[must_use]
    pub fn read(kind: EntityKind, message: &[u8], buffer_size: usize) -> Self {
        let payload = message.get(..buffer_size).unwrap_or(message).to_vec();
        Self {
            kind,
            payload,
            wire_len: message.len(),
        }
    }

    /// Returns `true` if the message did not fit in the read buffer.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.wire_len > self.payload.len()
    }
}

/// A unit of data read from a transport, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A raw WebSocket message.
    Raw(RawFrame),
    /// A Socket.IO event or acknowledgement packet.
    Packet(Packet),
}

/// A transport session that yields frames one at a time.
///
/// Implementations own their connection exclusively; the subscription loop
/// is the only caller and never calls `next_frame` concurrently.
pub trait FrameSource {
    /// Reads the next frame.
    ///
    /// `Ok(None)` means the source is exhausted. Errors are routed through
    /// [`classify`]: [`BusError::NoData`] asks for a retry, decode errors drop
    /// one message, anything else ends the session.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Frame>, BusError>> + Send;

    /// Protocol spoken by this session.
    fn protocol(&self) -> SubProtocol;
}

/// Counters kept for the lifetime of a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Records handed to the sink.
    pub dispatched: u64,
    /// Messages dropped because they could not be decoded.
    pub skipped: u64,
    /// Reads that found no data yet.
    pub idle: u64,
}

/// A running subscription: one source, one sink, one loop.
#[derive(Debug)]
pub struct Subscription<S, K> {
    source: S,
    sink: K,
    idle_retry: Duration,
    stats: SessionStats,
}

impl<S: FrameSource, K: RecordSink> Subscription<S, K> {
    /// Creates a subscription. `idle_retry` is the pause after a read that
    /// found no data yet.
    #[must_use]
    pub fn new(source: S, sink: K, idle_retry: Duration) -> Self {
        Self {
            source,
            sink,
            idle_retry,
            stats: SessionStats::default(),
        }
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Consumes the subscription, returning its sink.
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Runs the read/decode/dispatch loop.
    ///
    /// Returns `Ok(())` only if the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the session: a transport failure, a
    /// closed connection, or a failed write to the sink.
    pub async fn run(&mut self) -> Result<(), BusError> {
        let protocol = self.source.protocol();
        loop {
            let outcome = match self.source.next_frame().await {
                Ok(Some(frame)) => self.deliver(frame),
                Ok(None) => {
                    tracing::info!(%protocol, dispatched = self.stats.dispatched, skipped = self.stats.skipped, "subscription source exhausted");
                    return Ok(());
                }
                Err(err) => Err(err),
            };

            let Err(err) = outcome else {
                self.stats.dispatched = self.stats.dispatched.saturating_add(1);
                continue;
            };

            match classify(&err) {
                Disposition::Fatal => {
                    tracing::error!(%protocol, code = err.error_code(), error = %err, dispatched = self.stats.dispatched, skipped = self.stats.skipped, "subscription terminated");
                    return Err(err);
                }
                Disposition::Idle => {
                    self.stats.idle = self.stats.idle.saturating_add(1);
                    tokio::time::sleep(self.idle_retry).await;
                }
                Disposition::Recoverable => {
                    self.stats.skipped = self.stats.skipped.saturating_add(1);
                    tracing::warn!(%protocol, code = err.error_code(), error = %err, "dropping message");
                }
            }
        }
    }

    fn deliver(&mut self, frame: Frame) -> Result<(), BusError> {
        let message = decode::decode_frame(frame)?;
        self.sink.dispatch(&message)
    }
}
