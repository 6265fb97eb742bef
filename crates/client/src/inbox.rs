//! Conversation inbox and the booking currently in progress.

use luci_shared::shape::{first_array, first_string, CONVERSATION_LIST};
use luci_shared::{ApiError, ConversationSummary};
use serde_json::Value;

use crate::api_client::ApiClient;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inbox {
    pub conversations: Vec<ConversationSummary>,
    /// Booking to highlight: the server's explicit `currentBooking`, else the
    /// first accepted conversation.
    pub current_booking: Option<ConversationSummary>,
}

fn is_accepted(raw: &Value) -> bool {
    ["status", "bookingStatus"]
        .iter()
        .any(|k| raw.get(*k).and_then(Value::as_str) == Some("accepted"))
}

impl Inbox {
    pub fn from_response(body: &Value) -> Result<Self, ApiError> {
        let items = first_array(body, CONVERSATION_LIST)
            .ok_or_else(|| ApiError::Deserialize("no conversation list in response".into()))?;

        let conversations = items
            .iter()
            .filter_map(ConversationSummary::from_wire)
            .collect();

        let current_booking = body
            .get("currentBooking")
            .filter(|v| v.is_object())
            .and_then(ConversationSummary::from_wire)
            .or_else(|| {
                items
                    .iter()
                    .find(|raw| is_accepted(raw))
                    .and_then(ConversationSummary::from_wire)
            });

        Ok(Self {
            conversations,
            current_booking,
        })
    }
}

/// Fetch the inbox of `user_id`.
pub async fn fetch_inbox(api: &ApiClient, user_id: &str) -> Result<Inbox, ApiError> {
    let body = api.conversations(user_id).await?;
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = first_string(&body, &["/error", "/message"]).unwrap_or_default();
        return Err(ApiError::Deserialize(format!("conversations request failed: {reason}")));
    }
    Inbox::from_response(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn first_accepted_becomes_current() {
        let body = json!({"success": true, "chats": [
            {"id": "C1", "salonName": "Pending Spa", "status": "pending"},
            {"id": "C2", "salonName": "Zen Thai", "bookingStatus": "accepted", "salonOwnerId": "O2"}
        ]});
        let inbox = Inbox::from_response(&body).unwrap();
        assert_eq!(inbox.conversations.len(), 2);
        let current = inbox.current_booking.unwrap();
        assert_eq!(current.id, "C2");
        assert_eq!(current.receiver_id.as_deref(), Some("O2"));
    }

    #[test]
    fn explicit_current_booking_wins() {
        let body = json!({
            "conversations": [{"id": "C1", "status": "accepted"}],
            "currentBooking": {"id": "C9", "name": "Explicit"}
        });
        let inbox = Inbox::from_response(&body).unwrap();
        assert_eq!(inbox.current_booking.map(|c| c.id), Some("C9".to_string()));
    }

    #[tokio::test]
    async fn fetches_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/conversations/U1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "conversations": []})))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), Duration::from_secs(2));
        let inbox = fetch_inbox(&api, "U1").await.unwrap();
        assert!(inbox.conversations.is_empty());
        assert_eq!(inbox.current_booking, None);
    }
}
