//! Socket.IO packet codec.
//!
//! A Socket.IO packet rides inside an Engine.IO `message` packet:
//!
//! ```text
//! <type>[<attachments>-][/<namespace>,][<ack id>][<json data>]
//! ```
//!
//! The header (type, namespace, ack id) is decoded here; turning the JSON
//! arguments into something the sink understands is left to
//! [`crate::decode`].

use serde_json::Value;

use crate::error::DecodeError;

/// Namespace used when a packet names none.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Socket.IO packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Namespace connection request or acknowledgement.
    Connect,
    /// Namespace disconnection.
    Disconnect,
    /// Named event with arguments.
    Event,
    /// Acknowledgement of an earlier event.
    Ack,
    /// Namespace connection refused (`ERROR` in older revisions).
    ConnectError,
    /// Event whose arguments carry binary attachments.
    BinaryEvent,
    /// Acknowledgement whose arguments carry binary attachments.
    BinaryAck,
}

impl PacketKind {
    fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Connect),
            '1' => Some(Self::Disconnect),
            '2' => Some(Self::Event),
            '3' => Some(Self::Ack),
            '4' => Some(Self::ConnectError),
            '5' => Some(Self::BinaryEvent),
            '6' => Some(Self::BinaryAck),
            _ => None,
        }
    }

    const fn has_attachments(self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type.
    pub kind: PacketKind,
    /// Namespace the packet belongs to.
    pub namespace: String,
    /// Acknowledgement id, when present.
    pub ack_id: Option<u64>,
    /// Number of binary attachments that follow the packet.
    pub attachments: u32,
}

/// A Socket.IO packet: header plus optional JSON data.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// JSON data following the header, if any.
    pub data: Option<Value>,
}

/// Decodes a Socket.IO packet from the text of an Engine.IO message.
///
/// # Errors
///
/// Returns [`DecodeError::Packet`] for a malformed header and
/// [`DecodeError::Json`] for invalid JSON data.
pub fn decode(text: &str) -> Result<Packet, DecodeError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .and_then(PacketKind::from_digit)
        .ok_or_else(|| DecodeError::Packet(format!("invalid socket.io packet type in '{text}'")))?;
    let mut rest = chars.as_str();

    let mut attachments = 0;
    if kind.has_attachments() {
        let Some((count, after)) = rest.split_once('-') else {
            return Err(DecodeError::Packet(
                "binary packet without attachment count".to_string(),
            ));
        };
        attachments = count
            .parse()
            .map_err(|_| DecodeError::Packet(format!("invalid attachment count '{count}'")))?;
        rest = after;
    }

    let mut namespace = DEFAULT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        let (nsp, after) = rest.split_once(',').unwrap_or((rest, ""));
        namespace = nsp.to_string();
        rest = after;
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let (ack, data) = rest.split_at(digits);
    let ack_id = if ack.is_empty() {
        None
    } else {
        Some(
            ack.parse()
                .map_err(|_| DecodeError::Packet(format!("invalid ack id '{ack}'")))?,
        )
    };

    let data = if data.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str(data)?)
    };

    Ok(Packet {
        header: PacketHeader {
            kind,
            namespace,
            ack_id,
            attachments,
        },
        data,
    })
}

/// Encodes a namespace `CONNECT` packet.
#[must_use]
pub fn encode_connect(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        "0".to_string()
    } else {
        format!("0{namespace},")
    }
}
