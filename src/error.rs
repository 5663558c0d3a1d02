//! Client error types and the error policy of the subscription loop.
//!
//! [`BusError`] is the central error type for the client. Each variant maps
//! to a stable numeric code and to a [`Disposition`] through [`classify`],
//! which is the only place deciding whether a failure ends a session.

use std::time::Duration;

/// What the subscription loop does with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The session is over. The loop returns the error to its caller.
    Fatal,
    /// Nothing to read yet. The loop sleeps and reads again, silently.
    Idle,
    /// One message was lost. The loop logs it and reads the next one.
    Recoverable,
}

/// Message-scoped decode failures.
///
/// A decode error never ends a session: the offending message is dropped
/// and the loop moves on.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A raw frame exceeded the session's fixed read buffer.
    #[error("frame of {size} bytes exceeds the {limit} byte message buffer")]
    Oversized {
        /// Size of the received frame.
        size: usize,
        /// Configured buffer size.
        limit: usize,
    },

    /// Payload is not a valid record document.
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine.IO or Socket.IO framing could not be parsed.
    #[error("malformed packet: {0}")]
    Packet(String),

    /// Packet is well formed but carries something the client cannot use.
    #[error("unsupported packet: {0}")]
    Unsupported(String),
}

/// Client-side error enum with numeric code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category                  | Disposition  |
/// |-----------|---------------------------|--------------|
/// | 1000–1999 | Configuration / target    | Fatal        |
/// | 2000–2999 | Connection establishment  | Fatal        |
/// | 3000–3999 | Steady-state transport    | Fatal / Idle |
/// | 4000–4999 | Decode                    | Recoverable  |
/// | 5000–5999 | Output                    | Fatal        |
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Invalid subscription target or client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dialing the bus failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Address that was dialed.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// Engine.IO / Socket.IO handshake failed or was rejected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Connecting or handshaking did not finish in time.
    #[error("timed out after {0:?} while connecting")]
    ConnectTimeout(Duration),

    /// The peer closed the session.
    #[error("connection closed by peer: {0}")]
    Closed(String),

    /// Reading from or writing to an established session failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No new packet is available yet. Not a failure.
    #[error("no data available yet")]
    NoData,

    /// A single message could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Writing to the operator's output stream failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// The consumer of a channel sink went away.
    #[error("record receiver dropped")]
    SinkClosed,
}

impl BusError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 1001,
            Self::Connect { .. } => 2001,
            Self::Handshake(_) => 2002,
            Self::ConnectTimeout(_) => 2003,
            Self::Closed(_) => 3001,
            Self::Transport(_) => 3002,
            Self::NoData => 3100,
            Self::Decode(DecodeError::Oversized { .. }) => 4001,
            Self::Decode(DecodeError::Json(_)) => 4002,
            Self::Decode(DecodeError::Packet(_)) => 4003,
            Self::Decode(DecodeError::Unsupported(_)) => 4004,
            Self::Output(_) => 5001,
            Self::SinkClosed => 5002,
        }
    }

    /// Returns the policy the subscription loop applies to this error.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        classify(self)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BusError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                Self::Closed("websocket closed".to_string())
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BusError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Maps an error to the action the subscription loop takes.
///
/// Connection establishment, transport and output failures end the
/// session. "No data yet" is retried after a fixed delay. Decode failures
/// drop one message.
#[must_use]
pub const fn classify(err: &BusError) -> Disposition {
    match err {
        BusError::NoData => Disposition::Idle,
        BusError::Decode(_) => Disposition::Recoverable,
        BusError::InvalidConfig(_)
        | BusError::Connect { .. }
        | BusError::Handshake(_)
        | BusError::ConnectTimeout(_)
        | BusError::Closed(_)
        | BusError::Transport(_)
        | BusError::Output(_)
        | BusError::SinkClosed => Disposition::Fatal,
    }
}
