//! Message decoder: frames in, [`BusMessage`]s out.
//!
//! Every failure here is scoped to the one message being decoded. No
//! partially decoded record ever reaches the sink.

use serde_json::Value;

use crate::domain::{BusMessage, BusRecord, MultiplexedMessage};
use crate::error::DecodeError;
use crate::sio::packet::{Packet, PacketKind};
use crate::subscription::{Frame, RawFrame};

/// Decodes any frame produced by a transport.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the frame does not hold a complete record.
pub fn decode_frame(frame: Frame) -> Result<BusMessage, DecodeError> {
    match frame {
        Frame::Raw(raw) => decode_raw(&raw),
        Frame::Packet(packet) => decode_packet(packet),
    }
}

/// Decodes one raw WebSocket message as an event or action record.
///
/// # Errors
///
/// Returns [`DecodeError::Oversized`] if the message did not fit the read
/// buffer, or [`DecodeError::Json`] if it is not a record document.
pub fn decode_raw(frame: &RawFrame) -> Result<BusMessage, DecodeError> {
    if frame.is_truncated() {
        return Err(DecodeError::Oversized {
            size: frame.wire_len,
            limit: frame.payload.len(),
        });
    }
    let record: BusRecord = serde_json::from_slice(&frame.payload)?;
    Ok(BusMessage::Record {
        kind: frame.kind,
        record,
    })
}

/// Decodes the arguments of a Socket.IO event or acknowledgement.
///
/// Events carry their name as the first argument. Every remaining argument
/// must be a JSON object, and there must be at least one.
///
/// # Errors
///
/// Returns [`DecodeError::Unsupported`] for packet types without a payload
/// and for binary packets, and [`DecodeError::Packet`] for argument lists
/// that do not match the shape above.
pub fn decode_packet(packet: Packet) -> Result<BusMessage, DecodeError> {
    let Packet { header, data } = packet;
    match header.kind {
        PacketKind::Event | PacketKind::Ack => {}
        PacketKind::BinaryEvent | PacketKind::BinaryAck => {
            return Err(DecodeError::Unsupported(format!(
                "binary packet with {} attachment(s)",
                header.attachments
            )));
        }
        other => {
            return Err(DecodeError::Unsupported(format!(
                "{other:?} packet carries no payload"
            )));
        }
    }

    let Some(Value::Array(args)) = data else {
        return Err(DecodeError::Packet(
            "expected an argument array".to_string(),
        ));
    };
    let mut args = args.into_iter();

    let event = if header.kind == PacketKind::Event {
        match args.next() {
            Some(Value::String(name)) => Some(name),
            _ => {
                return Err(DecodeError::Packet(
                    "event packet without a name".to_string(),
                ));
            }
        }
    } else {
        None
    };

    let payloads = args
        .enumerate()
        .map(|(idx, arg)| match arg {
            Value::Object(map) => Ok(map),
            other => Err(DecodeError::Packet(format!(
                "argument {idx} is not a key/value mapping: {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if payloads.is_empty() {
        return Err(DecodeError::Packet(
            "packet carries no key/value payload".to_string(),
        ));
    }

    Ok(BusMessage::Multiplexed(MultiplexedMessage {
        namespace: header.namespace,
        event,
        ack_id: header.ack_id,
        payloads,
    }))
}
