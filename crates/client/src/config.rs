//! Client configuration from environment variables.

use std::time::Duration;

use crate::ws::{ReconnectConfig, TransportKind};

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const MIN_HTTP_TIMEOUT_SECS: u64 = 5;
const MAX_HTTP_TIMEOUT_SECS: u64 = 15;

/// Where the backend lives and how patiently we talk to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Origin of the REST API; paths are appended under `/api/v1`.
    pub api_base_url: String,
    /// Origin of the Socket.IO server.
    pub socket_url: String,
    pub http_timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub transports: Vec<TransportKind>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            socket_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            reconnect: ReconnectConfig::default(),
            transports: TransportKind::default_order(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from the process environment.
    ///
    /// Environment variables:
    /// - `LUCI_API_BASE_URL` (default: "http://localhost:3000")
    /// - `LUCI_SOCKET_URL` (default: the API base URL)
    /// - `LUCI_HTTP_TIMEOUT_SECS`: 5..=15, default 10
    /// - `LUCI_RECONNECT_ATTEMPTS` (default: 5)
    /// - `LUCI_RECONNECT_DELAY_MS` (default: 1000)
    /// - `LUCI_CONNECT_TIMEOUT_MS` (default: 20000)
    /// - `LUCI_TRANSPORTS`: comma separated, e.g. "websocket,polling"
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_u64 = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());

        let api_base_url = get("LUCI_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        let socket_url = get("LUCI_SOCKET_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| api_base_url.clone());

        let http_timeout = Duration::from_secs(
            parse_u64("LUCI_HTTP_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
                .clamp(MIN_HTTP_TIMEOUT_SECS, MAX_HTTP_TIMEOUT_SECS),
        );

        let reconnect = ReconnectConfig {
            max_attempts: parse_u64("LUCI_RECONNECT_ATTEMPTS")
                .map(|n| n as u32)
                .unwrap_or(defaults.reconnect.max_attempts),
            delay: parse_u64("LUCI_RECONNECT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.delay),
            connect_timeout: parse_u64("LUCI_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.connect_timeout),
        };

        let transports = get("LUCI_TRANSPORTS")
            .map(|v| {
                v.split(',')
                    .filter_map(|name| {
                        let kind = TransportKind::parse(name);
                        if kind.is_none() && !name.trim().is_empty() {
                            tracing::warn!("ignoring unknown transport {:?}", name);
                        }
                        kind
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.transports);

        Self {
            api_base_url,
            socket_url,
            http_timeout,
            reconnect,
            transports,
        }
    }
}
