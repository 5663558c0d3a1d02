//! Record sinks: where decoded messages end up.
//!
//! [`PrintSink`] renders each message for the operator. [`ChannelSink`]
//! hands messages to another task, for embedding the client in a larger
//! program.

use std::io::Write;

use chrono::SecondsFormat;
use tokio::sync::mpsc;

use crate::domain::{BusMessage, BusRecord, EntityKind, MultiplexedMessage};
use crate::error::BusError;

/// Consumer of decoded messages.
///
/// `dispatch` is called inline by the subscription loop, so a slow sink
/// slows down reading. It must not perform network I/O.
pub trait RecordSink {
    /// Handles one message.
    ///
    /// # Errors
    ///
    /// Any error ends the subscription.
    fn dispatch(&mut self, message: &BusMessage) -> Result<(), BusError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn dispatch(&mut self, message: &BusMessage) -> Result<(), BusError> {
        (**self).dispatch(message)
    }
}

/// Writes each message as a deterministic, human-readable block.
#[derive(Debug)]
pub struct PrintSink<W> {
    out: W,
}

impl PrintSink<std::io::Stdout> {
    /// Sink writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> PrintSink<W> {
    /// Creates a sink over any writer.
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for PrintSink<W> {
    fn dispatch(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let rendered = render(message);
        self.out.write_all(rendered.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Forwards messages to an unbounded channel.
///
/// The channel gives up backpressure: a slow receiver no longer slows the
/// read loop, and undelivered messages pile up in memory. Meant for tests
/// and for embedding the client in a program that drains the receiver
/// promptly. The binary uses [`PrintSink`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that observes it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn dispatch(&mut self, message: &BusMessage) -> Result<(), BusError> {
        self.tx
            .send(message.clone())
            .map_err(|_| BusError::SinkClosed)
    }
}

/// Renders a message. Output ends with a newline.
///
/// Records render as a header line followed by one indented `key=value`
/// line per property, in key order:
///
/// ```text
/// [2023-01-02T03:04:05Z] event casaos/app:install (id=42)
///   app=nginx
/// ```
///
/// Multiplexed messages render as a header line followed by each payload as
/// indented JSON.
#[must_use]
pub fn render(message: &BusMessage) -> String {
    match message {
        BusMessage::Record { kind, record } => render_record(*kind, record),
        BusMessage::Multiplexed(msg) => render_multiplexed(msg),
    }
}

fn render_record(kind: EntityKind, record: &BusRecord) -> String {
    let timestamp = record.timestamp.map_or_else(
        || "-".to_string(),
        |ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    );
    let mut out = format!(
        "[{timestamp}] {kind} {}/{} (id={})\n",
        record.source_id,
        record.name,
        record.event_id.as_deref().unwrap_or("-"),
    );
    for (key, value) in &record.properties {
        out.push_str(&format!("  {key}={value}\n"));
    }
    out
}

fn render_multiplexed(msg: &MultiplexedMessage) -> String {
    let mut out = format!(
        "[socketio] {} {}",
        msg.namespace,
        msg.event.as_deref().unwrap_or("<ack>")
    );
    if let Some(ack) = msg.ack_id {
        out.push_str(&format!(" (ack={ack})"));
    }
    out.push('\n');
    for payload in &msg.payloads {
        let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| format!("{payload:?}"));
        for line in pretty.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
