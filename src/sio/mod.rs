//! Multiplexed transport: Socket.IO over Engine.IO.
//!
//! - `engine`: Engine.IO packet and payload codec.
//! - `session`: handshake, WebSocket upgrade and heartbeat.
//! - `packet`: Socket.IO packet codec.
//! - `client`: the [`crate::subscription::FrameSource`] built on the above.

/// Socket.IO client.
pub mod client;
/// Engine.IO codec.
pub mod engine;
/// Socket.IO packet codec.
pub mod packet;
/// Engine.IO session management.
pub mod session;

pub use client::SocketIoClient;
pub use session::EngineSession;
