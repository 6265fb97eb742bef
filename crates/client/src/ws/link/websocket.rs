//! WebSocket transport using tokio-tungstenite.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use luci_shared::{EnginePacket, OpenHandshake, TransportError};
use tokio::sync::mpsc::unbounded_channel;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::Link;
use crate::ws::connection::TransportKind;

pub(super) async fn open(url: Url, timeout: Duration) -> Result<Link, TransportError> {
    let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| TransportError::Timeout(format!("websocket connect to {}", url)))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    // The server speaks first with the Engine.IO open packet
    let handshake = tokio::time::timeout(timeout, async {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match EnginePacket::decode(text.as_str())? {
                    EnginePacket::Open(hs) => return Ok(hs),
                    other => {
                        tracing::debug!(?other, "ignoring packet before open");
                    }
                },
                Ok(Message::Close(_)) => return Err(TransportError::Closed),
                Ok(_) => {}
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }
        Err::<OpenHandshake, _>(TransportError::Closed)
    })
    .await
    .map_err(|_| TransportError::Timeout("waiting for engine.io open packet".into()))??;

    let (in_tx, in_rx) = unbounded_channel();
    let (out_tx, mut out_rx) = unbounded_channel::<EnginePacket>();

    // Read task
    let in_tx_for_read = in_tx.clone();
    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            let forwarded = match frame {
                Ok(Message::Text(text)) => EnginePacket::decode(text.as_str()).map_err(TransportError::from),
                Ok(Message::Close(_)) => {
                    tracing::debug!("websocket received close frame");
                    break;
                }
                Ok(_) => continue,
                Err(e) => Err(TransportError::Connect(e.to_string())),
            };
            let failed = forwarded.is_err();
            if in_tx_for_read.send(forwarded).is_err() || failed {
                return;
            }
        }
        let _ = in_tx_for_read.send(Err(TransportError::Closed));
    });

    // Write task
    tokio::spawn(async move {
        while let Some(packet) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(packet.encode().into())).await {
                tracing::warn!("websocket send failed: {}", e);
                let _ = in_tx.send(Err(TransportError::Closed));
                break;
            }
        }
        let _ = write.close().await;
    });

    Ok(Link {
        kind: TransportKind::WebSocket,
        handshake,
        outgoing: out_tx,
        incoming: in_rx,
    })
}
