//! Lenient decoding for JSON whose shape has drifted across backend versions.
//!
//! Every ambiguous field is resolved through an explicit, ordered list of JSON
//! pointers, so the fallback order lives in one place instead of being spread
//! across call sites. The empty pointer `""` refers to the document root.

use serde::Deserialize;
use serde_json::Value;

/// Recommendation list keys, newest shape first.
pub const RECOMMENDATION_LIST: &[&str] = &["/recommendations", "/data", "/recommendation"];

/// Message history keys. A bare array at the root is also accepted.
pub const MESSAGE_LIST: &[&str] = &["/messages", "/data", ""];

/// Conversation list keys.
pub const CONVERSATION_LIST: &[&str] = &["/conversations", "/chats"];

/// Owner identity inside a salon-detail response.
pub const SALON_DETAIL_OWNER: &[&str] = &["/data/ownerId", "/ownerId"];

/// Owner identity inside a booking push event: top-level first, then the two
/// nested spellings older servers used.
pub const PUSH_EVENT_OWNER: &[&str] = &[
    "/salonOwnerId",
    "/booking/salonOwnerID",
    "/reciever/salonOwnerID",
];

/// Return the first non-null value found at any of `pointers`.
pub fn first_present<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a Value> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .find(|v| !v.is_null())
}

/// Return the first array found at any of `pointers`.
pub fn first_array<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a Vec<Value>> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .find_map(Value::as_array)
}

/// Return the first scalar at any of `pointers` rendered as a non-empty string.
pub fn first_string(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .find_map(scalar_to_string)
}

/// Return the first boolean found at any of `pointers`.
pub fn first_bool(value: &Value, pointers: &[&str]) -> Option<bool> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .find_map(Value::as_bool)
}

/// Render a JSON string or number as a trimmed, non-empty string.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An identity reference as the backend returns it: either a plain id or a
/// populated document that carries its id under `_id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OwnerRef {
    Plain(String),
    Numeric(i64),
    Reference {
        #[serde(rename = "_id", alias = "$oid")]
        id: Box<OwnerRef>,
    },
}

impl OwnerRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Collapse the reference to a single string identifier.
    pub fn into_id(self) -> Option<String> {
        match self {
            OwnerRef::Plain(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            OwnerRef::Numeric(n) => Some(n.to_string()),
            OwnerRef::Reference { id } => id.into_id(),
        }
    }
}

/// Normalize any id-like JSON value (plain or reference object) to a string.
pub fn normalize_id(value: &Value) -> Option<String> {
    OwnerRef::from_value(value).and_then(OwnerRef::into_id)
}

/// Try each pointer in order and return the first one that normalizes to an id.
pub fn first_id(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p))
        .filter(|v| !v.is_null())
        .find_map(normalize_id)
}
