//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Engine.IO frames the transport (`0` open, `2` ping, `3` pong, `4` message,
//! ...). A Socket.IO packet rides inside an Engine.IO `message`:
//!
//! ```text
//! 4 2 /chat, 12 ["send_message",{...}]
//! │ │ │      │  └ JSON data
//! │ │ │      └ optional ack id
//! │ │ └ namespace (omitted for "/")
//! │ └ socket packet type (EVENT)
//! └ engine packet type (MESSAGE)
//! ```
//!
//! Binary attachments are not used by the chat backend and are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PacketError;

/// Separates packets in a long-polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Body of the Engine.IO `open` packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(hs) => {
                format!("0{}", serde_json::to_string(hs).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    pub fn decode(raw: &str) -> Result<Self, PacketError> {
        let mut chars = raw.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => serde_json::from_str(rest)
                .map(EnginePacket::Open)
                .map_err(|e| PacketError::InvalidPayload(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

/// Split a long-polling response body into individual packets.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, PacketError> {
    body.split(RECORD_SEPARATOR)
        .filter(|p| !p.is_empty())
        .map(EnginePacket::decode)
        .collect()
}

/// Join packets into one long-polling request body.
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        SocketPacket::Event {
            namespace: namespace.to_string(),
            ack_id: None,
            name: name.to_string(),
            args: vec![payload],
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Encode as the body of an Engine.IO `message` packet (without the `4`).
    pub fn encode(&self) -> String {
        let (kind, ack, data) = match self {
            SocketPacket::Connect { data, .. } => ('0', None, data.clone()),
            SocketPacket::Disconnect { .. } => ('1', None, None),
            SocketPacket::Event {
                ack_id, name, args, ..
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                ('2', *ack_id, Some(Value::Array(items)))
            }
            SocketPacket::Ack { ack_id, args, .. } => {
                ('3', Some(*ack_id), Some(Value::Array(args.clone())))
            }
            SocketPacket::ConnectError { data, .. } => ('4', None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        let ns = self.namespace();
        if !ns.is_empty() && ns != "/" {
            out.push_str(ns);
            out.push(',');
        }
        if let Some(id) = ack {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Decode the body of an Engine.IO `message` packet.
    pub fn decode(raw: &str) -> Result<Self, PacketError> {
        let mut chars = raw.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = &rest[..idx];
                    rest = &rest[idx + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| PacketError::InvalidPayload(e.to_string()))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| PacketError::InvalidPayload(e.to_string()))?,
            )
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(PacketError::InvalidPayload("event data must be an array".into()));
                };
                if items.is_empty() {
                    return Err(PacketError::InvalidPayload("event without a name".into()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(PacketError::InvalidPayload("event name must be a string".into()));
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args: items,
                })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| PacketError::InvalidPayload("ack without an id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let raw = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let EnginePacket::Open(hs) = EnginePacket::decode(raw).unwrap() else {
            panic!("expected open packet");
        };
        assert_eq!(hs.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(hs.ping_interval, 25000);
        assert_eq!(hs.upgrades, vec!["websocket".to_string()]);
    }

    #[test]
    fn decodes_namespaced_event() {
        let EnginePacket::Message(body) =
            EnginePacket::decode(r#"42/chat,["receive_message",{"message":{"_id":"m1"}}]"#).unwrap()
        else {
            panic!("expected message packet");
        };
        let packet = SocketPacket::decode(&body).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/chat".into(),
                ack_id: None,
                name: "receive_message".into(),
                args: vec![json!({"message": {"_id": "m1"}})],
            }
        );
    }

    #[test]
    fn encodes_event_with_namespace_prefix() {
        let packet = SocketPacket::event("/chat", "user_connected", json!("U1"));
        assert_eq!(
            EnginePacket::Message(packet.encode()).encode(),
            r#"42/chat,["user_connected","U1"]"#
        );
        assert_eq!(SocketPacket::event("/", "x", json!(1)).encode(), r#"2["x",1]"#);
    }

    #[test]
    fn decodes_connect_ack_and_ack_ids() {
        assert_eq!(
            SocketPacket::decode(r#"0/chat,{"sid":"abc"}"#).unwrap(),
            SocketPacket::Connect {
                namespace: "/chat".into(),
                data: Some(json!({"sid": "abc"})),
            }
        );
        assert_eq!(
            SocketPacket::decode("1/chat").unwrap(),
            SocketPacket::Disconnect { namespace: "/chat".into() }
        );
        assert_eq!(
            SocketPacket::decode(r#"3/chat,7["ok"]"#).unwrap(),
            SocketPacket::Ack {
                namespace: "/chat".into(),
                ack_id: 7,
                args: vec![json!("ok")],
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(EnginePacket::decode(""), Err(PacketError::Empty));
        assert_eq!(EnginePacket::decode("9"), Err(PacketError::UnknownType('9')));
        assert!(SocketPacket::decode(r#"2/chat,{"not":"array"}"#).is_err());
        assert!(SocketPacket::decode(r#"2/chat,[42]"#).is_err());
    }

    #[test]
    fn polling_payload_uses_record_separator() {
        let body = "2\u{1e}42[\"user_typing\",{}]";
        let packets = decode_payload(body).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0], EnginePacket::Ping(String::new()));
        assert_eq!(encode_payload(&packets), body);
    }
}
