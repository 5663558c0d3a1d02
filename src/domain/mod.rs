//! Domain layer: subscription targets and the records they stream.
//!
//! This module contains the client-side model: entity kinds, the immutable
//! subscription target with its name filter, and the record types the bus
//! publishes.

pub mod entity;
pub mod record;
pub mod target;

pub use entity::EntityKind;
pub use record::{BusMessage, BusRecord, MultiplexedMessage};
pub use target::{NameFilter, SubscriptionTarget};
