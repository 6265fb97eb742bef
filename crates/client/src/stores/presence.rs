//! Presence and typing state of the peer in a conversation.

use luci_shared::{PresenceState, TypingState};

/// What we know about the other participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPresence {
    pub user_id: String,
    /// `None` until the server has told us anything
    pub is_online: Option<bool>,
    pub is_typing: bool,
}

impl PeerPresence {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_online: None,
            is_typing: false,
        }
    }

    /// Apply a `user_status` push. Pushes about other users are ignored.
    pub fn apply_presence(&mut self, state: &PresenceState) -> bool {
        if state.user_id != self.user_id || self.is_online == Some(state.is_online) {
            return false;
        }
        self.is_online = Some(state.is_online);
        if !state.is_online {
            self.is_typing = false;
        }
        true
    }

    /// Apply a `user_typing` push. Pushes about other users are ignored.
    pub fn apply_typing(&mut self, state: &TypingState) -> bool {
        if state.user_id != self.user_id || self.is_typing == state.is_typing {
            return false;
        }
        self.is_typing = state.is_typing;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_peer_counts() {
        let mut peer = PeerPresence::new("O1");
        assert!(!peer.apply_typing(&TypingState {
            user_id: "X".into(),
            is_typing: true
        }));
        assert!(peer.apply_typing(&TypingState {
            user_id: "O1".into(),
            is_typing: true
        }));
        assert!(!peer.apply_typing(&TypingState {
            user_id: "O1".into(),
            is_typing: true
        }));

        assert!(peer.apply_presence(&PresenceState {
            user_id: "O1".into(),
            is_online: false
        }));
        assert_eq!(peer.is_online, Some(false));
        assert!(!peer.is_typing);
    }
}
