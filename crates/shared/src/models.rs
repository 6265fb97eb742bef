//! Shared data models for the booking and chat protocol.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shape::{first_bool, first_id, first_present, first_string};

// --- Identity ---

/// The authenticated user of this client session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SessionIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            email: None,
        }
    }
}

/// Profile data held by the identity store for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// --- Booking ---

/// Default appointment length when the user has not picked one.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// How far ahead a quick booking is placed.
pub fn default_requested_time(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(1)
}

/// The salon a user picked from the recommendation deck.
///
/// `owner_id` is the top-level owner field of the recommendation and
/// `nested_owner_id` the one found inside the embedded salon document. When
/// both are present the top-level one wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalonSelection {
    pub salon_id: Option<String>,
    pub owner_id: Option<String>,
    pub nested_owner_id: Option<String>,
    pub name: Option<String>,
}

impl SalonSelection {
    pub fn new(salon_id: impl Into<String>) -> Self {
        Self {
            salon_id: Some(salon_id.into()),
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Owner identity carried by the selection itself, if any.
    pub fn known_owner(&self) -> Option<&str> {
        [self.owner_id.as_deref(), self.nested_owner_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Body of `POST /bookings/create-booking`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub salon_id: String,
    pub salon_owner_id: String,
    #[serde(rename = "firebaseUID")]
    pub firebase_uid: String,
    pub name: String,
    pub email: String,
    pub requested_date_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub age: u32,
    pub weight_kg: u32,
}

/// Parsed acknowledgment of a created booking.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingAck {
    pub booking_id: Option<String>,
    pub status: Option<String>,
    pub raw: Value,
}

impl BookingAck {
    pub fn from_body(raw: Value) -> Self {
        let booking_id = first_id(
            &raw,
            &["/data/_id", "/booking/_id", "/data/bookingId", "/bookingId", "/_id"],
        );
        let status = first_string(&raw, &["/data/status", "/booking/status", "/status"]);
        Self {
            booking_id,
            status,
            raw,
        }
    }
}

/// A server-pushed change in a booking's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Accepted {
        booking_id: String,
        conversation_id: String,
        salon_owner_id: Option<String>,
        booking: Value,
    },
    Rejected {
        booking_id: String,
        booking: Value,
    },
    ChatRoomCreated {
        conversation_id: String,
        booking_id: Option<String>,
        salon_owner_id: Option<String>,
        salon_owner_name: Option<String>,
    },
    StatusUpdate {
        booking_id: String,
        status: String,
        booking: Value,
    },
}

impl BookingOutcome {
    pub fn booking_id(&self) -> Option<&str> {
        match self {
            BookingOutcome::Accepted { booking_id, .. }
            | BookingOutcome::Rejected { booking_id, .. }
            | BookingOutcome::StatusUpdate { booking_id, .. } => Some(booking_id),
            BookingOutcome::ChatRoomCreated { booking_id, .. } => booking_id.as_deref(),
        }
    }

    /// Accepted and rejected are terminal; at most one of them matters per booking.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingOutcome::Accepted { .. } | BookingOutcome::Rejected { .. }
        )
    }
}

// --- Chat ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
}

/// Lifecycle of a chat message as seen by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
}

/// A message in a conversation's local sequence.
///
/// `id` is assigned by the server; `temp_id` is the client-side id carried
/// while the send is pending and kept afterwards for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub temp_id: Option<String>,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    pub read: bool,
}

impl ChatMessage {
    pub fn status(&self) -> MessageStatus {
        if self.id.is_none() {
            MessageStatus::Pending
        } else if self.read {
            MessageStatus::Read
        } else if self.delivered {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }

    pub fn message_type(&self) -> MessageType {
        if self.image_url.is_some() && self.text.is_none() {
            MessageType::Image
        } else {
            MessageType::Text
        }
    }

    /// Decode a message object as the chat backend sends it, in REST history
    /// responses and inside `receive_message` / `message_sent` pushes.
    ///
    /// Returns `None` when the object carries neither a server id nor a temp id.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let id = first_id(value, &["/_id", "/id"]);
        let temp_id = first_string(value, &["/tempId"]);
        if id.is_none() && temp_id.is_none() {
            return None;
        }

        Some(Self {
            id,
            temp_id,
            conversation_id: first_id(value, &["/conversationId", "/conversation"])
                .unwrap_or_default(),
            sender_id: first_id(value, &["/sender/_id", "/senderId", "/sender"])
                .unwrap_or_default(),
            receiver_id: first_id(value, &["/receiver/_id", "/receiverId", "/receiver"])
                .unwrap_or_default(),
            text: first_string(value, &["/text", "/message"]),
            image_url: first_string(value, &["/imageUrl", "/image"]),
            created_at: first_present(value, &["/createdAt", "/timestamp"])
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            delivered: first_bool(value, &["/isDelivered", "/delivered"]).unwrap_or(false),
            read: first_bool(value, &["/isRead", "/read"]).unwrap_or(false),
        })
    }
}

/// Parse an RFC 3339 string or a millisecond epoch number.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceState {
    pub user_id: String,
    pub is_online: bool,
}

// --- Conversations ---

/// One row of the conversations inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub conversation_id: Option<String>,
    pub name: Option<String>,
    pub receiver_id: Option<String>,
    pub status: Option<String>,
    pub appointment_time: Option<String>,
    pub avatar: Option<String>,
}

impl ConversationSummary {
    pub fn from_wire(value: &Value) -> Option<Self> {
        let id = first_id(value, &["/id", "/_id", "/conversationId"])?;
        Some(Self {
            conversation_id: first_id(value, &["/conversationId", "/id", "/_id"]),
            name: first_string(value, &["/salonName", "/name"]),
            receiver_id: first_id(value, &["/salonOwnerId", "/receiverId", "/id"]),
            status: first_string(value, &["/status", "/bookingStatus"]),
            appointment_time: first_string(value, &["/appointmentTime", "/time"]),
            avatar: first_string(value, &["/salonImage", "/avatar"]),
            id,
        })
    }

    pub fn is_accepted(&self) -> bool {
        self.status.as_deref() == Some("accepted")
    }
}

// --- Recommendations ---

/// A salon card in the recommendation deck.
#[derive(Debug, Clone, PartialEq)]
pub struct Studio {
    pub id: String,
    pub name: String,
    pub price: u32,
    pub rating: f64,
    pub location: String,
    pub services: Vec<String>,
    pub image_url: Option<String>,
    pub score: f64,
    pub reasons: Vec<String>,
    pub is_subscribed: bool,
    pub owner_id: Option<String>,
}

impl Studio {
    pub fn to_selection(&self) -> SalonSelection {
        SalonSelection {
            salon_id: Some(self.id.clone()),
            owner_id: self.owner_id.clone(),
            nested_owner_id: None,
            name: Some(self.name.clone()),
        }
    }
}
