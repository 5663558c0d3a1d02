//! Socket.IO client on top of an [`EngineSession`].

use super::engine::{EnginePacket, EngineVersion};
use super::packet::{self, DEFAULT_NAMESPACE, PacketKind};
use super::session::EngineSession;
use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::{BusError, DecodeError};
use crate::subscription::{Frame, FrameSource, SubProtocol};

/// Subscription to the multiplexed endpoint.
///
/// Yields every event and acknowledgement packet as a [`Frame::Packet`].
/// Namespace control packets are handled here: a connect acknowledgement
/// counts as "no data yet", a disconnect or connect error ends the session.
#[derive(Debug)]
pub struct SocketIoClient {
    session: EngineSession,
    namespace: String,
}

impl SocketIoClient {
    /// Opens an Engine.IO session and joins `namespace`.
    ///
    /// # Errors
    ///
    /// Returns any connection establishment error from
    /// [`EngineSession::connect`], or a transport error if the namespace
    /// connect packet cannot be sent.
    pub async fn connect(
        endpoint: &Endpoint,
        config: &ClientConfig,
        namespace: &str,
    ) -> Result<Self, BusError> {
        let namespace = normalize_namespace(namespace);
        let mut session = EngineSession::connect(endpoint, config).await?;

        // Revision 3 servers join the default namespace implicitly.
        if session.version() == EngineVersion::V4 || namespace != DEFAULT_NAMESPACE {
            session
                .send(EnginePacket::Message(packet::encode_connect(&namespace)))
                .await?;
        }

        tracing::info!(url = %endpoint.socketio_url(), sid = session.sid(), protocol = %session.protocol(), %namespace, "subscribed via socketio");
        Ok(Self { session, namespace })
    }

    /// Namespace this client joined.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl FrameSource for SocketIoClient {
    async fn next_frame(&mut self) -> Result<Option<Frame>, BusError> {
        let text = match self.session.recv().await? {
            EnginePacket::Message(text) => text,
            other => {
                return Err(DecodeError::Unsupported(format!(
                    "{} engine.io packet",
                    other.kind_str()
                ))
                .into());
            }
        };

        let packet = packet::decode(&text)?;
        match packet.header.kind {
            PacketKind::Connect => {
                tracing::info!(namespace = %packet.header.namespace, "namespace connected");
                Err(BusError::NoData)
            }
            PacketKind::Disconnect => Err(BusError::Closed(format!(
                "namespace {} disconnected",
                packet.header.namespace
            ))),
            PacketKind::ConnectError => Err(BusError::Handshake(format!(
                "namespace {} refused: {}",
                packet.header.namespace,
                packet.data.map(|d| d.to_string()).unwrap_or_default()
            ))),
            _ => Ok(Some(Frame::Packet(packet))),
        }
    }

    fn protocol(&self) -> SubProtocol {
        self.session.protocol()
    }
}

fn normalize_namespace(namespace: &str) -> String {
    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
