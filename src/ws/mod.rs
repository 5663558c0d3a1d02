//! Raw WebSocket transport.
//!
//! Per-entity endpoints at `ws://<host>/<base>/<event|action>/<source-id>`
//! stream one JSON record per frame.

pub mod connection;

pub use connection::RawConnection;
