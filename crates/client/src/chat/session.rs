//! One open conversation: history, optimistic sends, pushes, receipts.

use std::sync::{Arc, Weak};

use chrono::Utc;
use luci_shared::shape::{first_array, first_bool, first_id, first_string, MESSAGE_LIST};
use luci_shared::{
    client_events, server_events, ChatError, ChatMessage, MessageReadPayload,
    PresenceState, SendMessagePayload, StatusUpdate, TypingState,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::typing::TypingIndicator;
use crate::api_client::ApiClient;
use crate::stores::{ConversationMessages, PeerPresence};
use crate::ws::{ListenerId, TransportManager};

const EVENT_CAPACITY: usize = 64;

/// Something observers of a chat session should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A message was appended (own optimistic send or a received push).
    MessageAdded(ChatMessage),
    /// A pending message got its permanent id.
    MessageReconciled { temp_id: String, message: ChatMessage },
    StatusChanged { message_id: String, delivered: bool, read: bool },
    HistoryLoaded { count: usize },
    PeerTyping(bool),
    PeerPresence(bool),
    /// The server reported that a send failed.
    SendFailed { temp_id: Option<String>, error: String },
}

/// Participants of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    pub conversation_id: String,
    pub me: String,
    pub peer: String,
}

struct SessionInner {
    transport: TransportManager,
    api: ApiClient,
    who: Participants,
    messages: Mutex<ConversationMessages>,
    peer: Mutex<PeerPresence>,
    events: broadcast::Sender<ChatEvent>,
}

impl SessionInner {
    fn publish(&self, event: ChatEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn on_receive(&self, payload: &Value) {
        let raw = payload.get("message").unwrap_or(payload);
        let Some(mut msg) = ChatMessage::from_wire(raw) else {
            tracing::warn!("dropping receive_message without an id");
            return;
        };
        if msg.conversation_id.is_empty() {
            msg.conversation_id = self.who.conversation_id.clone();
        } else if msg.conversation_id != self.who.conversation_id {
            tracing::debug!(conversation_id = %msg.conversation_id, "message for another conversation");
            return;
        }

        // Our own message echoed back on another path
        if let Some(temp_id) = msg.temp_id.clone() {
            if self.reconcile(&temp_id, &msg) {
                return;
            }
        }

        let added = self.messages.lock().push(msg.clone());
        if !added {
            return;
        }
        self.publish(ChatEvent::MessageAdded(msg.clone()));

        if msg.sender_id != self.who.me {
            if let Some(id) = msg.id.as_deref() {
                self.acknowledge(id);
            }
        }
    }

    /// Tell the sender the message arrived and was seen; the screen is open.
    fn acknowledge(&self, message_id: &str) {
        if let Err(e) = self
            .transport
            .emit(client_events::MESSAGE_DELIVERED, &message_id)
        {
            tracing::debug!(message_id, "delivery receipt not sent: {}", e);
        }
        let read = MessageReadPayload {
            message_id: message_id.to_string(),
            conversation_id: self.who.conversation_id.clone(),
            user_id: self.who.me.clone(),
        };
        if let Err(e) = self.transport.emit(client_events::MESSAGE_READ, &read) {
            tracing::debug!(message_id, "read receipt not sent: {}", e);
        }
    }

    fn on_sent(&self, payload: &Value) {
        let raw = payload.get("message").unwrap_or(payload);
        let Some(confirmed) = ChatMessage::from_wire(raw) else {
            tracing::warn!("dropping message_sent without ids");
            return;
        };
        let Some(temp_id) = confirmed.temp_id.clone() else {
            tracing::debug!("message_sent without tempId");
            return;
        };
        if !self.reconcile(&temp_id, &confirmed) {
            tracing::debug!(temp_id, "message_sent for unknown tempId");
        }
    }

    fn reconcile(&self, temp_id: &str, confirmed: &ChatMessage) -> bool {
        let reconciled = {
            let mut messages = self.messages.lock();
            messages
                .reconcile(temp_id, confirmed)
                .map(|pos| messages.messages[pos].clone())
        };
        match reconciled {
            Some(message) => {
                self.publish(ChatEvent::MessageReconciled {
                    temp_id: temp_id.to_string(),
                    message,
                });
                true
            }
            None => false,
        }
    }

    fn on_status(&self, payload: &Value) {
        match StatusUpdate::from_push(payload) {
            Ok(update) => self.apply_status(&update),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    fn apply_status(&self, update: &StatusUpdate) {
        let changed = {
            let mut messages = self.messages.lock();
            if messages.apply_status(update) {
                messages
                    .position_of_id(&update.message_id)
                    .map(|pos| (messages.messages[pos].delivered, messages.messages[pos].read))
            } else {
                None
            }
        };
        if let Some((delivered, read)) = changed {
            self.publish(ChatEvent::StatusChanged {
                message_id: update.message_id.clone(),
                delivered,
                read,
            });
        }
    }

    fn on_presence(&self, payload: &Value) {
        let (Some(user_id), Some(is_online)) = (
            first_id(payload, &["/userId"]),
            first_bool(payload, &["/isOnline", "/online"]),
        ) else {
            tracing::warn!("malformed user_status push");
            return;
        };
        if self.peer.lock().apply_presence(&PresenceState { user_id, is_online }) {
            self.publish(ChatEvent::PeerPresence(is_online));
        }
    }

    fn on_typing(&self, payload: &Value) {
        let (Some(user_id), Some(is_typing)) = (
            first_id(payload, &["/userId"]),
            first_bool(payload, &["/isTyping"]),
        ) else {
            tracing::warn!("malformed user_typing push");
            return;
        };
        if self.peer.lock().apply_typing(&TypingState { user_id, is_typing }) {
            self.publish(ChatEvent::PeerTyping(is_typing));
        }
    }

    fn on_error(&self, payload: &Value) {
        let error = first_string(payload, &["/error", "/message"]).unwrap_or_else(|| "send failed".into());
        let temp_id = first_string(payload, &["/tempId"]);
        tracing::warn!(conversation_id = %self.who.conversation_id, "message error from server: {}", error);
        self.publish(ChatEvent::SendFailed { temp_id, error });
    }
}

/// Snapshot of a session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub history_loaded: bool,
    pub peer: PeerPresence,
}

/// Message stream of one conversation with optimistic sends and eventual
/// reconciliation. Borrows the shared connection; never closes it.
pub struct ChatSession {
    inner: Arc<SessionInner>,
    typing: TypingIndicator,
    listeners: Mutex<Vec<ListenerId>>,
}

impl ChatSession {
    /// Start listening for pushes of this conversation.
    pub fn open(transport: TransportManager, api: ApiClient, who: Participants) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(SessionInner {
            transport: transport.clone(),
            api,
            messages: Mutex::new(ConversationMessages::default()),
            peer: Mutex::new(PeerPresence::new(who.peer.clone())),
            who,
            events,
        });
        let typing = TypingIndicator::new(transport.clone(), inner.who.me.clone(), inner.who.peer.clone());

        type Route = fn(&SessionInner, &Value);
        let routes: [(&str, Route); 6] = [
            (server_events::RECEIVE_MESSAGE, SessionInner::on_receive),
            (server_events::MESSAGE_SENT, SessionInner::on_sent),
            (server_events::MESSAGE_STATUS_UPDATE, SessionInner::on_status),
            (server_events::USER_STATUS, SessionInner::on_presence),
            (server_events::USER_TYPING, SessionInner::on_typing),
            (server_events::MESSAGE_ERROR, SessionInner::on_error),
        ];

        let listeners = routes
            .into_iter()
            .map(|(event, route)| {
                let weak: Weak<SessionInner> = Arc::downgrade(&inner);
                transport.on(event, move |payload| {
                    if let Some(inner) = weak.upgrade() {
                        route(&inner, payload);
                    }
                })
            })
            .collect();

        tracing::debug!(conversation_id = %inner.who.conversation_id, "chat session opened");
        Self {
            inner,
            typing,
            listeners: Mutex::new(listeners),
        }
    }

    pub fn participants(&self) -> &Participants {
        &self.inner.who
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let messages = self.inner.messages.lock();
        ChatSnapshot {
            messages: messages.messages.clone(),
            history_loaded: messages.is_loaded,
            peer: self.inner.peer.lock().clone(),
        }
    }

    pub fn typing(&self) -> &TypingIndicator {
        &self.typing
    }

    /// Fetch the conversation history and merge it into the local sequence.
    ///
    /// On failure the local sequence is left untouched and the error is
    /// returned for a retry. Marking the conversation read afterwards is
    /// best effort.
    pub async fn load_history(&self) -> Result<Vec<ChatMessage>, ChatError> {
        let who = &self.inner.who;
        let body = self.inner.api.messages(&who.conversation_id).await.map_err(|e| {
            tracing::warn!(conversation_id = %who.conversation_id, "loading messages failed: {}", e);
            ChatError::from(e)
        })?;

        let items = first_array(&body, MESSAGE_LIST)
            .ok_or_else(|| ChatError::Decode("no message list in response".into()))?;
        let history: Vec<ChatMessage> = items
            .iter()
            .filter_map(ChatMessage::from_wire)
            .map(|mut m| {
                if m.conversation_id.is_empty() {
                    m.conversation_id = who.conversation_id.clone();
                }
                m
            })
            .collect();
        let count = history.len();

        let merged = {
            let mut messages = self.inner.messages.lock();
            messages.merge_history(history);
            messages.messages.clone()
        };
        tracing::info!(conversation_id = %who.conversation_id, count, "history loaded");
        self.inner.publish(ChatEvent::HistoryLoaded { count });

        if let Err(e) = self.inner.api.mark_read(&who.conversation_id, &who.me).await {
            tracing::warn!(conversation_id = %who.conversation_id, "could not mark messages as read: {}", e);
        }
        Ok(merged)
    }

    /// Send a text message. Fails up front when disconnected; nothing is
    /// inserted or queued in that case.
    pub fn send_text(&self, text: &str) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.send(Some(text.to_string()), None)
    }

    /// Send an image by URI.
    pub fn send_image(&self, uri: &str) -> Result<ChatMessage, ChatError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.send(None, Some(uri.to_string()))
    }

    fn send(&self, text: Option<String>, image_url: Option<String>) -> Result<ChatMessage, ChatError> {
        let inner = &self.inner;
        if !inner.transport.is_connected() {
            return Err(ChatError::TransportDisconnected);
        }

        let temp_id = Uuid::new_v4().to_string();
        let pending = ChatMessage {
            id: None,
            temp_id: Some(temp_id.clone()),
            conversation_id: inner.who.conversation_id.clone(),
            sender_id: inner.who.me.clone(),
            receiver_id: inner.who.peer.clone(),
            text,
            image_url,
            created_at: Utc::now(),
            delivered: false,
            read: false,
        };
        let payload = SendMessagePayload {
            conversation_id: pending.conversation_id.clone(),
            sender_id: pending.sender_id.clone(),
            receiver_id: pending.receiver_id.clone(),
            text: pending.text.clone(),
            image_url: pending.image_url.clone(),
            message_type: pending.message_type(),
            temp_id: temp_id.clone(),
        };

        inner.messages.lock().push(pending.clone());
        if let Err(e) = inner.transport.emit(client_events::SEND_MESSAGE, &payload) {
            // Lost the link between the check and the emit
            inner.messages.lock().messages.retain(|m| m.temp_id.as_deref() != Some(&temp_id));
            tracing::warn!("send_message not emitted: {}", e);
            return Err(ChatError::TransportDisconnected);
        }

        inner.publish(ChatEvent::MessageAdded(pending.clone()));
        self.typing.stop();
        Ok(pending)
    }

    /// Merge delivery flags into a message; flags only ever go false to true.
    pub fn apply_status_update(&self, message_id: &str, delivered: Option<bool>, read: Option<bool>) {
        self.inner.apply_status(&StatusUpdate {
            message_id: message_id.to_string(),
            delivered,
            read,
        });
    }

    /// Stop this session's listeners. The connection stays open for others.
    pub fn close(&self) {
        self.typing.stop();
        for id in self.listeners.lock().drain(..) {
            self.inner.transport.off_listener(id);
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}
