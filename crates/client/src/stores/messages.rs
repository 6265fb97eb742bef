//! Message store for one conversation.
//!
//! Messages are kept in the order they were locally sent or received. Server
//! timestamps never reorder the sequence.

use luci_shared::{ChatMessage, StatusUpdate};

/// Messages of a single conversation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConversationMessages {
    pub messages: Vec<ChatMessage>,
    /// Whether history has been fetched from the REST API.
    pub is_loaded: bool,
}

impl ConversationMessages {
    pub fn position_of_id(&self, id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.id.as_deref() == Some(id))
    }

    pub fn position_of_temp_id(&self, temp_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.temp_id.as_deref() == Some(temp_id))
    }

    /// Append at the tail. Returns false if the id or tempId is already present.
    pub fn push(&mut self, msg: ChatMessage) -> bool {
        let duplicate = msg.id.as_deref().and_then(|id| self.position_of_id(id)).is_some()
            || msg
                .temp_id
                .as_deref()
                .and_then(|t| self.position_of_temp_id(t))
                .is_some();
        if duplicate {
            return false;
        }
        self.messages.push(msg);
        true
    }

    /// Swap the pending entry for `temp_id` to the server's permanent id and
    /// timestamp, in place.
    ///
    /// If the server copy already arrived through another path, that copy is
    /// dropped so the message appears once, at its original position.
    /// Returns the position of the reconciled entry.
    pub fn reconcile(&mut self, temp_id: &str, confirmed: &ChatMessage) -> Option<usize> {
        let mut pos = self.position_of_temp_id(temp_id)?;

        if let Some(server_id) = confirmed.id.as_deref() {
            if let Some(dup) = self.position_of_id(server_id) {
                if dup != pos {
                    self.messages.remove(dup);
                    if dup < pos {
                        pos -= 1;
                    }
                }
            }
        }

        let entry = &mut self.messages[pos];
        if confirmed.id.is_some() {
            entry.id = confirmed.id.clone();
        }
        entry.created_at = confirmed.created_at;
        entry.delivered |= confirmed.delivered;
        entry.read |= confirmed.read;
        if entry.image_url.is_none() {
            entry.image_url = confirmed.image_url.clone();
        }
        Some(pos)
    }

    /// Merge delivery flags. A flag that is already true is never cleared.
    /// Returns true if anything changed.
    pub fn apply_status(&mut self, update: &StatusUpdate) -> bool {
        let Some(pos) = self.position_of_id(&update.message_id) else {
            return false;
        };
        let msg = &mut self.messages[pos];
        let before = (msg.delivered, msg.read);

        if update.delivered == Some(true) {
            msg.delivered = true;
        }
        if update.read == Some(true) {
            msg.read = true;
            msg.delivered = true;
        }
        before != (msg.delivered, msg.read)
    }

    /// Install server history, keeping local entries the server does not know
    /// about yet (pending sends, pushes that raced the fetch) after it.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>) {
        let mut merged: Vec<ChatMessage> = Vec::with_capacity(history.len() + self.messages.len());
        for msg in history {
            let seen = msg
                .id
                .as_deref()
                .map(|id| merged.iter().any(|m| m.id.as_deref() == Some(id)))
                .unwrap_or(false);
            if seen {
                continue;
            }
            // Keep flags we already learned from pushes
            let msg = match msg.id.as_deref().and_then(|id| self.position_of_id(id)) {
                Some(local) => {
                    let known = &self.messages[local];
                    ChatMessage {
                        delivered: msg.delivered || known.delivered,
                        read: msg.read || known.read,
                        ..msg
                    }
                }
                None => msg,
            };
            merged.push(msg);
        }

        for local in self.messages.drain(..) {
            let synced = local
                .id
                .as_deref()
                .map(|id| merged.iter().any(|m| m.id.as_deref() == Some(id)))
                .unwrap_or(false);
            if !synced {
                merged.push(local);
            }
        }

        self.messages = merged;
        self.is_loaded = true;
    }
}
