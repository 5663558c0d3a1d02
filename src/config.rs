//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Command-line flags override these
//! values in the binary before a subscription is started.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

use crate::error::BusError;
use crate::sio::engine::EngineVersion;

/// Path prefix of the message bus API on the gateway.
pub const DEFAULT_BASE_PATH: &str = "v2/message_bus";

/// Gateway configuration file consulted when no root URL is configured.
pub const DEFAULT_GATEWAY_CONFIG: &str = "/etc/casaos/gateway.ini";

/// Root URL used when neither the environment nor the gateway file has one.
pub const DEFAULT_ROOT_URL: &str = "localhost:80";

/// Default raw-mode read buffer in bytes.
pub const DEFAULT_MESSAGE_BUFFER_SIZE: usize = 1024;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the gateway fronting the message bus.
    pub root_url: String,

    /// Path prefix of the bus API (e.g. `v2/message_bus`).
    pub base_path: String,

    /// Bound on dialing, handshaking and upgrade probing.
    pub connect_timeout: Duration,

    /// Sleep between reads when the multiplexed transport has no data yet.
    pub idle_retry_interval: Duration,

    /// Engine.IO protocol revision spoken on the multiplexed endpoint.
    pub engine_version: EngineVersion,

    /// Whether to attempt a WebSocket upgrade after the polling handshake.
    pub prefer_websocket: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root_url: DEFAULT_ROOT_URL.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            connect_timeout: Duration::from_secs(10),
            idle_retry_interval: Duration::from_millis(100),
            engine_version: EngineVersion::V3,
            prefer_websocket: true,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if `BUS_ENGINE_IO_VERSION` is set
    /// to something other than `3` or `4`.
    pub fn from_env() -> Result<Self, BusError> {
        dotenvy::dotenv().ok();

        let gateway_config = std::env::var("BUS_GATEWAY_CONFIG")
            .map_or_else(|_| PathBuf::from(DEFAULT_GATEWAY_CONFIG), PathBuf::from);

        let root_url = std::env::var("BUS_ROOT_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| root_url_from_gateway(&gateway_config));

        let base_path =
            std::env::var("BUS_BASE_PATH").unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string());

        let connect_timeout = Duration::from_secs(parse_env("BUS_CONNECT_TIMEOUT_SECS", 10));
        let idle_retry_interval = Duration::from_millis(parse_env("BUS_IDLE_RETRY_MS", 100));

        let engine_version = match std::env::var("BUS_ENGINE_IO_VERSION") {
            Ok(raw) => raw.parse()?,
            Err(_) => EngineVersion::V3,
        };

        let prefer_websocket = parse_env_bool("BUS_PREFER_WEBSOCKET", true);

        Ok(Self {
            root_url,
            base_path,
            connect_timeout,
            idle_retry_interval,
            engine_version,
            prefer_websocket,
        })
    }

    /// Default raw-mode buffer size, honouring `BUS_MESSAGE_BUFFER_SIZE`.
    #[must_use]
    pub fn message_buffer_size_from_env() -> usize {
        parse_env("BUS_MESSAGE_BUFFER_SIZE", DEFAULT_MESSAGE_BUFFER_SIZE)
    }
}

/// Derives `localhost:<port>` from the `[gateway]` section of the gateway
/// configuration file, or [`DEFAULT_ROOT_URL`] when the file or key is
/// missing.
#[must_use]
pub fn root_url_from_gateway(path: &Path) -> String {
    match Ini::load_from_file(path) {
        Ok(ini) => match gateway_port(&ini) {
            Some(port) => format!("localhost:{port}"),
            None => DEFAULT_ROOT_URL.to_string(),
        },
        Err(ini::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            DEFAULT_ROOT_URL.to_string()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot read gateway config, using default root url");
            DEFAULT_ROOT_URL.to_string()
        }
    }
}

fn gateway_port(ini: &Ini) -> Option<&str> {
    ini.section(Some("gateway"))
        .and_then(|section| section.get("port"))
        .map(str::trim)
        .filter(|port| !port.is_empty())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
