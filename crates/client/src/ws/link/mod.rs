//! Engine.IO transports.
//!
//! A [`Link`] is an opened Engine.IO session over one transport, reduced to a
//! pair of packet channels. Everything above it (namespace connect, heartbeat,
//! dispatch) is transport-agnostic.

use std::time::Duration;

use luci_shared::{EnginePacket, OpenHandshake, TransportError, ENGINE_PATH};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use url::Url;

use super::connection::TransportKind;

mod polling;
mod websocket;

/// Engine.IO protocol revision spoken by the chat backend.
const ENGINE_VERSION: &str = "4";

pub struct Link {
    pub kind: TransportKind,
    pub handshake: OpenHandshake,
    pub outgoing: UnboundedSender<EnginePacket>,
    pub incoming: UnboundedReceiver<Result<EnginePacket, TransportError>>,
}

impl Link {
    /// How long the server may stay silent before the session is considered dead.
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(self.handshake.ping_interval + self.handshake.ping_timeout)
    }

    pub fn send(&self, packet: EnginePacket) -> Result<(), TransportError> {
        self.outgoing.send(packet).map_err(|_| TransportError::Closed)
    }
}

/// Open a link over `kind`.
pub async fn open(
    kind: TransportKind,
    base: &Url,
    http: &reqwest::Client,
    timeout: Duration,
) -> Result<Link, TransportError> {
    let url = engine_url(base, kind, None)?;
    match kind {
        TransportKind::WebSocket => websocket::open(url, timeout).await,
        TransportKind::Polling => polling::open(http.clone(), base.clone(), url, timeout).await,
    }
}

/// Build the Engine.IO endpoint URL for a transport.
pub fn engine_url(base: &Url, kind: TransportKind, sid: Option<&str>) -> Result<Url, TransportError> {
    let mut url = base.clone();
    if kind == TransportKind::WebSocket {
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::Connect(format!("cannot use {} for websocket", base)))?;
    }
    url.set_path(ENGINE_PATH);
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("EIO", ENGINE_VERSION);
        query.append_pair("transport", kind.as_query());
        if let Some(sid) = sid {
            query.append_pair("sid", sid);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_engine_urls() {
        let base = Url::parse("https://chat.example.com/ignored?x=1").unwrap();
        assert_eq!(
            engine_url(&base, TransportKind::WebSocket, None).unwrap().as_str(),
            "wss://chat.example.com/socket.io/?EIO=4&transport=websocket"
        );
        let base = Url::parse("http://127.0.0.1:3000").unwrap();
        assert_eq!(
            engine_url(&base, TransportKind::Polling, Some("abc")).unwrap().as_str(),
            "http://127.0.0.1:3000/socket.io/?EIO=4&transport=polling&sid=abc"
        );
    }
}
