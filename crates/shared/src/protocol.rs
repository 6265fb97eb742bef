//! Realtime event names and payloads of the `/chat` namespace.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedPushEvent;
use crate::models::{BookingOutcome, MessageType};
use crate::shape::{first_bool, first_id, first_string, PUSH_EVENT_OWNER};

/// Socket.IO namespace of the chat backend.
pub const CHAT_NAMESPACE: &str = "/chat";

/// Engine.IO request path.
pub const ENGINE_PATH: &str = "/socket.io/";

/// Events emitted by the client.
pub mod client_events {
    pub const USER_CONNECTED: &str = "user_connected";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const TYPING: &str = "typing";
    pub const MESSAGE_DELIVERED: &str = "message_delivered";
    pub const MESSAGE_READ: &str = "message_read";
}

/// Events pushed by the server.
pub mod server_events {
    pub const RECEIVE_MESSAGE: &str = "receive_message";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const MESSAGE_STATUS_UPDATE: &str = "message_status_update";
    pub const USER_STATUS: &str = "user_status";
    pub const USER_TYPING: &str = "user_typing";
    pub const MESSAGE_ERROR: &str = "message_error";

    pub const BOOKING_ACCEPTED: &str = "booking_accepted";
    pub const BOOKING_REJECTED: &str = "booking_rejected";
    pub const CHAT_ROOM_CREATED: &str = "chat_room_created";
    pub const BOOKING_STATUS_UPDATE: &str = "booking_status_update";
    pub const BOOKING_NOTIFICATION: &str = "booking_notification";

    /// Every booking lifecycle event the router listens to.
    pub const BOOKING_LIFECYCLE: &[&str] = &[
        BOOKING_ACCEPTED,
        BOOKING_REJECTED,
        CHAT_ROOM_CREATED,
        BOOKING_STATUS_UPDATE,
        BOOKING_NOTIFICATION,
    ];
}

/// Payload of `send_message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub message_type: MessageType,
    pub temp_id: String,
}

/// Payload of `typing`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: String,
    pub receiver_id: String,
    pub is_typing: bool,
}

/// Payload of `message_read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: String,
    pub conversation_id: String,
    pub user_id: String,
}

/// Decoded `message_status_update`. Absent flags are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message_id: String,
    pub delivered: Option<bool>,
    pub read: Option<bool>,
}

impl StatusUpdate {
    pub fn from_push(payload: &Value) -> Result<Self, MalformedPushEvent> {
        let message_id = first_id(payload, &["/messageId", "/_id"]).ok_or(MalformedPushEvent {
            event: server_events::MESSAGE_STATUS_UPDATE.to_string(),
            missing: "messageId",
        })?;
        Ok(Self {
            message_id,
            delivered: first_bool(payload, &["/isDelivered", "/delivered"]),
            read: first_bool(payload, &["/isRead", "/read"]),
        })
    }
}

fn malformed(event: &str, missing: &'static str) -> MalformedPushEvent {
    MalformedPushEvent {
        event: event.to_string(),
        missing,
    }
}

fn booking_id(payload: &Value) -> Option<String> {
    first_id(payload, &["/bookingId", "/booking/_id", "/booking/id", "/_id"])
}

fn booking_doc(payload: &Value) -> Value {
    payload.get("booking").cloned().unwrap_or_else(|| payload.clone())
}

fn conversation_id(payload: &Value) -> Option<String> {
    first_id(
        payload,
        &[
            "/conversationId",
            "/conversation/_id",
            "/booking/conversationId",
            "/chatRoomId",
        ],
    )
}

fn accepted(event: &str, payload: &Value) -> Result<BookingOutcome, MalformedPushEvent> {
    Ok(BookingOutcome::Accepted {
        booking_id: booking_id(payload).ok_or_else(|| malformed(event, "bookingId"))?,
        conversation_id: conversation_id(payload)
            .ok_or_else(|| malformed(event, "conversationId"))?,
        salon_owner_id: first_id(payload, PUSH_EVENT_OWNER),
        booking: booking_doc(payload),
    })
}

fn rejected(event: &str, payload: &Value) -> Result<BookingOutcome, MalformedPushEvent> {
    Ok(BookingOutcome::Rejected {
        booking_id: booking_id(payload).ok_or_else(|| malformed(event, "bookingId"))?,
        booking: booking_doc(payload),
    })
}

fn status_update(
    event: &str,
    payload: &Value,
    status: Option<String>,
) -> Result<BookingOutcome, MalformedPushEvent> {
    Ok(BookingOutcome::StatusUpdate {
        booking_id: booking_id(payload).ok_or_else(|| malformed(event, "bookingId"))?,
        status: status.ok_or_else(|| malformed(event, "status"))?,
        booking: booking_doc(payload),
    })
}

fn push_status(payload: &Value) -> Option<String> {
    first_string(payload, &["/status", "/booking/status", "/type"])
        .map(|s| s.to_ascii_lowercase())
}

/// Translate a booking lifecycle push into a [`BookingOutcome`].
///
/// `booking_notification` is the catch-all name some server versions use; it
/// routes on its `type` / `status` field.
pub fn decode_booking_push(event: &str, payload: &Value) -> Result<BookingOutcome, MalformedPushEvent> {
    use server_events::*;

    match event {
        BOOKING_ACCEPTED => accepted(event, payload),
        BOOKING_REJECTED => rejected(event, payload),
        CHAT_ROOM_CREATED => Ok(BookingOutcome::ChatRoomCreated {
            conversation_id: conversation_id(payload)
                .ok_or_else(|| malformed(event, "conversationId"))?,
            booking_id: booking_id(payload),
            salon_owner_id: first_id(payload, PUSH_EVENT_OWNER),
            salon_owner_name: first_string(
                payload,
                &["/salonOwnerName", "/booking/salonOwnerName", "/reciever/name"],
            ),
        }),
        BOOKING_STATUS_UPDATE => status_update(event, payload, push_status(payload)),
        BOOKING_NOTIFICATION => {
            let kind = first_string(payload, &["/type", "/status", "/booking/status"])
                .map(|s| s.to_ascii_lowercase());
            match kind.as_deref() {
                Some("accepted") | Some("booking_accepted") => accepted(event, payload),
                Some("rejected") | Some("booking_rejected") => rejected(event, payload),
                _ => status_update(event, payload, push_status(payload)),
            }
        }
        _ => Err(malformed(event, "a known booking event name")),
    }
}

impl BookingOutcome {
    pub fn from_push(event: &str, payload: &Value) -> Result<Self, MalformedPushEvent> {
        decode_booking_push(event, payload)
    }
}
