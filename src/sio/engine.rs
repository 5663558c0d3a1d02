//! Engine.IO packet and payload codec.
//!
//! Engine.IO is the lower of the two layers spoken by the multiplexed
//! endpoint. Each packet is a single type digit followed by its data:
//!
//! ```text
//! 0 open     {"sid":..,"upgrades":[..],"pingInterval":..,"pingTimeout":..}
//! 1 close
//! 2 ping     [data]
//! 3 pong     [data]
//! 4 message  <socket.io packet>
//! 5 upgrade
//! 6 noop
//! ```
//!
//! Over long-polling several packets share one HTTP body. Revision 3 frames
//! them as `<len>:<packet>` (with `b64=1` so binary data stays text);
//! revision 4 separates them with the ASCII record separator `0x1e`.

use serde::{Deserialize, Serialize};

use crate::error::{BusError, DecodeError};

const RECORD_SEPARATOR: &str = "\u{1e}";

/// Engine.IO protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineVersion {
    /// Revision 3: client-initiated heartbeat, length-prefixed payloads.
    V3,
    /// Revision 4: server-initiated heartbeat, separator-delimited payloads.
    V4,
}

impl EngineVersion {
    /// Value of the `EIO` query parameter.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::V3 => "3",
            Self::V4 => "4",
        }
    }
}

impl std::str::FromStr for EngineVersion {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3" => Ok(Self::V3),
            "4" => Ok(Self::V4),
            other => Err(BusError::InvalidConfig(format!(
                "unsupported engine.io version '{other}', expected 3 or 4"
            ))),
        }
    }
}

/// Handshake data carried by the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    /// Session id assigned by the server.
    pub sid: String,
    /// Transports the session may be upgraded to, best first.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Heartbeat interval in milliseconds.
    pub ping_interval: u64,
    /// Heartbeat timeout in milliseconds.
    pub ping_timeout: u64,
    /// Largest polling payload the server accepts (revision 4 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenPayload {
    /// Returns `true` if the server offers a WebSocket upgrade.
    #[must_use]
    pub fn offers_websocket(&self) -> bool {
        self.upgrades.iter().any(|t| t == "websocket")
    }
}

/// A single Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// Session opened.
    Open(OpenPayload),
    /// Session closed.
    Close,
    /// Heartbeat or probe request.
    Ping(String),
    /// Heartbeat or probe response.
    Pong(String),
    /// Application data (a Socket.IO packet).
    Message(String),
    /// Transport upgrade completed.
    Upgrade,
    /// No operation.
    Noop,
    /// Binary application data, left undecoded.
    Binary(Vec<u8>),
}

impl EnginePacket {
    /// Encodes the packet as text.
    ///
    /// Returns `None` for packets a client never originates (`open` and
    /// binary data).
    #[must_use]
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::Close => Some("1".to_string()),
            Self::Ping(data) => Some(format!("2{data}")),
            Self::Pong(data) => Some(format!("3{data}")),
            Self::Message(data) => Some(format!("4{data}")),
            Self::Upgrade => Some("5".to_string()),
            Self::Noop => Some("6".to_string()),
            Self::Open(_) | Self::Binary(_) => None,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Close => "close",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Message(_) => "message",
            Self::Upgrade => "upgrade",
            Self::Noop => "noop",
            Self::Binary(_) => "binary",
        }
    }
}

/// Decodes one text-encoded packet.
///
/// # Errors
///
/// Returns [`DecodeError::Packet`] for an empty packet or an unknown type,
/// and [`DecodeError::Json`] for an `open` packet with invalid handshake data.
pub fn decode_packet(text: &str) -> Result<EnginePacket, DecodeError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(DecodeError::Packet("empty engine.io packet".to_string()));
    };
    let data = chars.as_str();
    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(data)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(data.to_string())),
        '3' => Ok(EnginePacket::Pong(data.to_string())),
        '4' => Ok(EnginePacket::Message(data.to_string())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        'b' => Ok(EnginePacket::Binary(data.as_bytes().to_vec())),
        other => Err(DecodeError::Packet(format!(
            "unknown engine.io packet type '{other}'"
        ))),
    }
}

/// One decoded packet of a polling body, or the reason it was unreadable.
pub type PayloadItem = Result<EnginePacket, DecodeError>;

/// Decodes a long-polling body into its packets.
///
/// Each packet is decoded on its own, so a malformed packet yields one
/// `Err` item and leaves its neighbours intact. In a revision 3 body the
/// length prefix still locates the next packet. If the framing itself is
/// broken, the packets before the break are kept and a single `Err` item
/// stands for the unreadable rest.
#[must_use]
pub fn decode_payload(version: EngineVersion, body: &str) -> Vec<PayloadItem> {
    match version {
        EngineVersion::V4 => body
            .split(RECORD_SEPARATOR)
            .filter(|p| !p.is_empty())
            .map(decode_packet)
            .collect(),
        EngineVersion::V3 => {
            let mut items = Vec::new();
            let mut rest = body;
            while !rest.is_empty() {
                match split_v3_packet(rest) {
                    Ok((packet, remainder)) => {
                        items.push(decode_packet(packet));
                        rest = remainder;
                    }
                    Err(err) => {
                        items.push(Err(err));
                        break;
                    }
                }
            }
            items
        }
    }
}

/// Splits `<len>:<packet>` off the front of a revision 3 body. The length
/// counts characters, not bytes.
fn split_v3_packet(body: &str) -> Result<(&str, &str), DecodeError> {
    let Some((len, after)) = body.split_once(':') else {
        return Err(DecodeError::Packet(
            "missing length prefix in polling payload".to_string(),
        ));
    };
    let len: usize = len
        .parse()
        .map_err(|_| DecodeError::Packet(format!("invalid length prefix '{len}'")))?;
    let end = match after.char_indices().nth(len) {
        Some((idx, _)) => idx,
        None if after.chars().count() == len => after.len(),
        None => {
            return Err(DecodeError::Packet(format!(
                "polling payload truncated: expected {len} characters"
            )));
        }
    };
    Ok(after.split_at(end))
}

/// Encodes packets into a long-polling body.
///
/// Packets without a text encoding are skipped.
#[must_use]
pub fn encode_payload(version: EngineVersion, packets: &[EnginePacket]) -> String {
    let encoded = packets.iter().filter_map(EnginePacket::encode);
    match version {
        EngineVersion::V4 => encoded
            .collect::<Vec<_>>()
            .join(RECORD_SEPARATOR),
        EngineVersion::V3 => encoded
            .map(|p| format!("{}:{p}", p.chars().count()))
            .collect(),
    }
}
