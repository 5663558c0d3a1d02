//! Records streamed by the message bus.
//!
//! Events and actions share one wire shape, [`BusRecord`]. The multiplexed
//! endpoint delivers generic key/value payloads instead, carried as
//! [`MultiplexedMessage`]. Both reach the sink wrapped in a [`BusMessage`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityKind;

/// One event or action as published on the bus.
///
/// `source_id` and `name` are required; a document missing either is not a
/// record. The bus's camelCase field names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusRecord {
    /// Publication time, when the bus stamps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Bus-assigned identifier.
    #[serde(default, alias = "uuid", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Service instance owning the stream.
    #[serde(alias = "sourceID", alias = "source")]
    pub source_id: String,
    /// Event or action name.
    pub name: String,
    /// Opaque properties, ordered by key.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A decoded Socket.IO event or acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplexedMessage {
    /// Namespace the packet was addressed to (`/` by default).
    pub namespace: String,
    /// Event name; `None` for acknowledgements.
    pub event: Option<String>,
    /// Acknowledgement id, when the packet carries one.
    pub ack_id: Option<u64>,
    /// Key/value arguments, in packet order.
    pub payloads: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Everything the sink can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// A typed record from a raw subscription.
    Record {
        /// Entity kind of the subscription that produced it.
        kind: EntityKind,
        /// The decoded record.
        record: BusRecord,
    },
    /// A generic payload from the multiplexed endpoint.
    Multiplexed(MultiplexedMessage),
}
