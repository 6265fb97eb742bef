//! Error taxonomy shared by the client components.

use serde_json::Value;
use thiserror::Error;

/// Whatever a non-2xx response body carried.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerDiagnostic {
    Json(Value),
    Text(String),
    Empty,
}

impl ServerDiagnostic {
    /// Prefer structured JSON, fall back to the raw text.
    pub fn from_body(body: &str) -> Self {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return ServerDiagnostic::Empty;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(v) => ServerDiagnostic::Json(v),
            Err(_) => ServerDiagnostic::Text(trimmed.to_string()),
        }
    }

    /// A one-line description for the user. Reads `error`, then `message`.
    pub fn summary(&self) -> Option<String> {
        match self {
            ServerDiagnostic::Json(v) => ["error", "message"]
                .iter()
                .filter_map(|k| v.get(*k))
                .find_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                    Value::Object(_) => v
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                }),
            ServerDiagnostic::Text(t) => Some(t.clone()),
            ServerDiagnostic::Empty => None,
        }
    }
}

impl std::fmt::Display for ServerDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.summary() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "no details"),
        }
    }
}

/// HTTP-level failure of an API call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Timeout, DNS, refused connection, reset.
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// Failure of a booking submission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    #[error("no signed-in user")]
    Unauthenticated,
    #[error("selection has no salon id")]
    MissingSalonId,
    #[error("no email address could be resolved for the requester")]
    MissingContactInfo,
    #[error("salon owner information is missing")]
    MissingOwnerInfo,
    #[error("server unreachable: {0}")]
    ServerUnreachable(String),
    #[error("server rejected the booking (HTTP {status}): {diagnostic}")]
    ServerRejected {
        status: u16,
        diagnostic: ServerDiagnostic,
    },
    /// The exchange failed to (de)serialize; the server may still have
    /// recorded the booking.
    #[error("unreadable booking exchange: {0}")]
    Decode(String),
}

impl BookingError {
    /// Retry-capable text naming the likely cause.
    pub fn user_message(&self) -> String {
        match self {
            BookingError::Unauthenticated => "Please sign in again to send a booking request.".into(),
            BookingError::MissingSalonId => "This salon cannot be booked right now. Please try another one.".into(),
            BookingError::MissingContactInfo => {
                "Add an email address to your profile so the salon can reach you.".into()
            }
            BookingError::MissingOwnerInfo => {
                "Salon owner information is missing. Please try another salon or contact support.".into()
            }
            BookingError::ServerUnreachable(_) => {
                "Could not reach the booking server. Check your connection and try again.".into()
            }
            BookingError::ServerRejected { diagnostic, .. } => match diagnostic.summary() {
                Some(s) => format!("Booking request failed: {}. Please try again.", s),
                None => "Failed to send booking request. Please try again.".into(),
            },
            BookingError::Decode(_) => {
                "The booking server sent an unexpected reply. Check your bookings before trying again.".into()
            }
        }
    }

    /// Raised before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            BookingError::Unauthenticated
                | BookingError::MissingSalonId
                | BookingError::MissingContactInfo
                | BookingError::MissingOwnerInfo
        )
    }
}

impl From<ApiError> for BookingError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unreachable(msg) => BookingError::ServerUnreachable(msg),
            ApiError::Http { status, body } => BookingError::ServerRejected {
                status,
                diagnostic: ServerDiagnostic::from_body(&body),
            },
            ApiError::Deserialize(msg) => BookingError::Decode(msg),
        }
    }
}

/// Failure of a chat session operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    #[error("not connected to the chat server")]
    TransportDisconnected,
    #[error("message is empty")]
    EmptyMessage,
    #[error("server unreachable: {0}")]
    ServerUnreachable(String),
    #[error("server rejected the request (HTTP {status}): {diagnostic}")]
    ServerRejected {
        status: u16,
        diagnostic: ServerDiagnostic,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<ApiError> for ChatError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unreachable(msg) => ChatError::ServerUnreachable(msg),
            ApiError::Http { status, body } => ChatError::ServerRejected {
                status,
                diagnostic: ServerDiagnostic::from_body(&body),
            },
            ApiError::Deserialize(msg) => ChatError::Decode(msg),
        }
    }
}

/// Failure of the realtime transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection closed")]
    Closed,
    #[error("codec error: {0}")]
    Codec(#[from] PacketError),
    #[error("timed out: {0}")]
    Timeout(String),
}

/// A Socket.IO / Engine.IO frame that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownType(char),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A server push whose payload lacks the fields its event requires.
/// Logged and dropped by the router, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed `{event}` push: missing {missing}")]
pub struct MalformedPushEvent {
    pub event: String,
    pub missing: &'static str,
}
