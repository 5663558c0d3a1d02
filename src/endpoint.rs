//! Subscription address resolution.
//!
//! Turns the configured gateway root and a [`SubscriptionTarget`] into the
//! addresses dialed by the transports.

use crate::domain::SubscriptionTarget;
use crate::error::BusError;

const SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

/// Canonical location of the message bus on a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    base_path: String,
}

impl Endpoint {
    /// Builds an endpoint from a root URL (`host:port`, optionally with a
    /// scheme and trailing slash) and the bus base path.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if the host is empty.
    pub fn new(root_url: &str, base_path: &str) -> Result<Self, BusError> {
        let trimmed = root_url.trim();
        let without_scheme = SCHEMES
            .iter()
            .find_map(|scheme| trimmed.strip_prefix(scheme))
            .unwrap_or(trimmed);
        let host = without_scheme.trim_end_matches('/');
        if host.is_empty() {
            return Err(BusError::InvalidConfig("host must not be empty".to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            base_path: base_path.trim_matches('/').to_string(),
        })
    }

    /// Host (and port) of the gateway.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Raw WebSocket address for a subscription.
    ///
    /// `ws://<host>/<base>/<event|action>/<source-id>[?names=<csv>]`. The
    /// `names` parameter is present only when the target has a filter.
    #[must_use]
    pub fn subscription_url(&self, target: &SubscriptionTarget) -> String {
        let mut url = format!(
            "ws://{}/{}/{}",
            self.host,
            self.prefixed(target.entity_kind().path_segment()),
            target.source_id()
        );
        if let Some(filter) = target.name_filter() {
            url.push_str("?names=");
            url.push_str(filter.as_str());
        }
        url
    }

    /// HTTP address of the multiplexed (Socket.IO) endpoint.
    #[must_use]
    pub fn socketio_url(&self) -> String {
        format!("http://{}/{}/", self.host, self.prefixed("socket.io"))
    }

    /// WebSocket address of the multiplexed endpoint, used for upgrades.
    #[must_use]
    pub fn socketio_ws_url(&self) -> String {
        format!("ws://{}/{}/", self.host, self.prefixed("socket.io"))
    }

    fn prefixed(&self, segment: &str) -> String {
        if self.base_path.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{segment}", self.base_path)
        }
    }
}
