//! HTTP long-polling transport, used when a WebSocket cannot be opened.

use std::time::Duration;

use luci_shared::packet::{decode_payload, encode_payload};
use luci_shared::{EnginePacket, TransportError};
use tokio::sync::mpsc::unbounded_channel;
use url::Url;

use super::{engine_url, Link};
use crate::ws::connection::TransportKind;

/// Extra slack on top of the heartbeat window for a single long-poll.
const POLL_GRACE: Duration = Duration::from_secs(5);

async fn get_payload(
    http: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<Vec<EnginePacket>, TransportError> {
    let resp = http
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;
    if !resp.status().is_success() {
        return Err(TransportError::Connect(format!("poll returned HTTP {}", resp.status())));
    }
    let body = resp
        .text()
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    Ok(decode_payload(&body)?)
}

pub(super) async fn open(
    http: reqwest::Client,
    base: Url,
    url: Url,
    timeout: Duration,
) -> Result<Link, TransportError> {
    let mut packets = get_payload(&http, &url, timeout).await?.into_iter();
    let handshake = match packets.next() {
        Some(EnginePacket::Open(hs)) => hs,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };

    let session_url = engine_url(&base, TransportKind::Polling, Some(&handshake.sid))?;
    let poll_timeout =
        Duration::from_millis(handshake.ping_interval + handshake.ping_timeout) + POLL_GRACE;

    let (in_tx, in_rx) = unbounded_channel();
    let (out_tx, mut out_rx) = unbounded_channel::<EnginePacket>();

    for packet in packets {
        let _ = in_tx.send(Ok(packet));
    }

    // Poll task
    let http_for_read = http.clone();
    let url_for_read = session_url.clone();
    let in_tx_for_read = in_tx.clone();
    tokio::spawn(async move {
        while !in_tx_for_read.is_closed() {
            match get_payload(&http_for_read, &url_for_read, poll_timeout).await {
                Ok(packets) => {
                    for packet in packets {
                        let closing = packet == EnginePacket::Close;
                        if in_tx_for_read.send(Ok(packet)).is_err() || closing {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = in_tx_for_read.send(Err(e));
                    return;
                }
            }
        }
    });

    // Write task: batch whatever is queued into one POST
    tokio::spawn(async move {
        while let Some(first) = out_rx.recv().await {
            let mut batch = vec![first];
            while let Ok(more) = out_rx.try_recv() {
                batch.push(more);
            }
            let result = http
                .post(session_url.clone())
                .timeout(timeout)
                .header("Content-Type", "text/plain;charset=UTF-8")
                .body(encode_payload(&batch))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    tracing::warn!("polling POST returned HTTP {}", resp.status());
                    let _ = in_tx.send(Err(TransportError::Closed));
                    break;
                }
                Err(e) => {
                    tracing::warn!("polling POST failed: {}", e);
                    let _ = in_tx.send(Err(TransportError::Closed));
                    break;
                }
            }
        }
    });

    Ok(Link {
        kind: TransportKind::Polling,
        handshake,
        outgoing: out_tx,
        incoming: in_rx,
    })
}
