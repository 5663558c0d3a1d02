//! Entry point for starting subscriptions.

use crate::config::ClientConfig;
use crate::domain::SubscriptionTarget;
use crate::endpoint::Endpoint;
use crate::error::BusError;
use crate::sink::RecordSink;
use crate::sio::SocketIoClient;
use crate::subscription::Subscription;
use crate::ws::RawConnection;

/// Wire protocol requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// Per-entity raw WebSocket endpoint.
    #[default]
    WebSocket,
    /// Multiplexed Socket.IO endpoint.
    SocketIo,
}

/// Creates subscriptions against one message bus.
///
/// Each call to a `subscribe*` method opens its own session; sessions share
/// nothing and may run concurrently.
#[derive(Debug, Clone)]
pub struct BusClient {
    config: ClientConfig,
    endpoint: Endpoint,
}

impl BusClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if the root URL has no host.
    pub fn new(config: ClientConfig) -> Result<Self, BusError> {
        let endpoint = Endpoint::new(&config.root_url, &config.base_path)?;
        Ok(Self { config, endpoint })
    }

    /// Resolved bus endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Streams `target` into `sink` until the session ends.
    ///
    /// With [`TransportKind::SocketIo`] the multiplexed endpoint is used in
    /// its default namespace; it carries every entity, so the target's
    /// source and name filter do not narrow the stream.
    ///
    /// # Errors
    ///
    /// Returns the connection establishment error, or the fatal error that
    /// ended the session.
    pub async fn subscribe<K: RecordSink>(
        &self,
        target: &SubscriptionTarget,
        transport: TransportKind,
        sink: K,
    ) -> Result<(), BusError> {
        match transport {
            TransportKind::WebSocket => {
                let source = RawConnection::connect(&self.endpoint, target, &self.config).await?;
                Subscription::new(source, sink, self.config.idle_retry_interval)
                    .run()
                    .await
            }
            TransportKind::SocketIo => {
                tracing::debug!(source_id = target.source_id(), "socketio carries all sources; target filter not applied");
                self.subscribe_multiplexed(crate::sio::packet::DEFAULT_NAMESPACE, sink)
                    .await
            }
        }
    }

    /// Streams every packet of the multiplexed endpoint in `namespace` into
    /// `sink` until the session ends.
    ///
    /// # Errors
    ///
    /// Returns the connection establishment error, or the fatal error that
    /// ended the session.
    pub async fn subscribe_multiplexed<K: RecordSink>(
        &self,
        namespace: &str,
        sink: K,
    ) -> Result<(), BusError> {
        let source = SocketIoClient::connect(&self.endpoint, &self.config, namespace).await?;
        Subscription::new(source, sink, self.config.idle_retry_interval)
            .run()
            .await
    }
}
