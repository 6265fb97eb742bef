//! Connection state and reconnect policy for the realtime channel.

use std::time::Duration;

/// Connection state for the realtime channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted. Stays here until the next `connect()`.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts after the first try
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Upper bound for opening a transport and completing the handshake
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(20000),
        }
    }
}

impl ReconnectConfig {
    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// Underlying transport of an Engine.IO session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn as_query(&self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Some(TransportKind::WebSocket),
            "polling" | "long-polling" => Some(TransportKind::Polling),
            _ => None,
        }
    }

    /// Persistent channel first, long-polling as the fallback.
    pub fn default_order() -> Vec<TransportKind> {
        vec![TransportKind::WebSocket, TransportKind::Polling]
    }
}
