//! # bus-tap
//!
//! Streaming subscription client for a home-server message bus.
//!
//! The bus publishes events and actions over two incompatible wire
//! protocols: a bare WebSocket carrying one JSON record per frame, and a
//! multiplexed Socket.IO endpoint that negotiates between HTTP long-polling
//! and WebSocket before any data flows. This crate attaches to either,
//! decodes what arrives, and hands each record to a sink.
//!
//! ## Architecture
//!
//! ```text
//! ClientConfig + SubscriptionTarget
//!     │
//!     ├── Endpoint (endpoint)
//!     │
//!     ├── RawConnection (ws/)          ─┐
//!     ├── SocketIoClient (sio/)         ├── FrameSource
//!     │     └── EngineSession          ─┘
//!     │
//!     ├── Subscription loop (subscription) ── classify (error)
//!     ├── Decoder (decode)
//!     │
//!     └── RecordSink (sink): PrintSink, ChannelSink
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod sink;
pub mod sio;
pub mod subscription;
pub mod ws;

pub use client::{BusClient, TransportKind};
pub use error::{BusError, DecodeError, Disposition};
