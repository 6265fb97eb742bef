//! Debounced typing signal.

use std::sync::Arc;
use std::time::Duration;

use luci_shared::{client_events, TypingPayload};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::ws::TransportManager;

/// Inactivity after which "typing" is cleared.
pub const TYPING_IDLE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct TypingState {
    /// What the peer was last told
    announced: bool,
    /// Bumped on every keystroke so a stale timer does nothing
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Emits `typing: true` on the first keystroke and `typing: false` once the
/// user stops for [`TYPING_IDLE`], instead of one event per keystroke.
#[derive(Clone)]
pub struct TypingIndicator {
    transport: TransportManager,
    user_id: String,
    receiver_id: String,
    idle: Duration,
    state: Arc<Mutex<TypingState>>,
}

impl TypingIndicator {
    pub fn new(transport: TransportManager, user_id: impl Into<String>, receiver_id: impl Into<String>) -> Self {
        Self {
            transport,
            user_id: user_id.into(),
            receiver_id: receiver_id.into(),
            idle: TYPING_IDLE,
            state: Arc::new(Mutex::new(TypingState::default())),
        }
    }

    /// React to the input box changing: text means typing, empty means stop.
    pub fn input_changed(&self, text: &str) {
        self.set_typing(!text.is_empty());
    }

    pub fn set_typing(&self, is_typing: bool) {
        if is_typing {
            self.keystroke();
        } else {
            self.stop();
        }
    }

    pub fn is_typing(&self) -> bool {
        self.state.lock().announced
    }

    fn keystroke(&self) {
        let mut state = self.state.lock();
        if !state.announced && self.emit(true) {
            state.announced = true;
        }

        state.generation += 1;
        let generation = state.generation;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let this = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(this.idle).await;
            let mut state = this.state.lock();
            if state.generation == generation && state.announced {
                this.emit(false);
                state.announced = false;
                state.timer = None;
            }
        }));
    }

    /// Clear immediately, e.g. after sending or when the input is emptied.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.announced {
            self.emit(false);
            state.announced = false;
        }
    }

    fn emit(&self, is_typing: bool) -> bool {
        let payload = TypingPayload {
            user_id: self.user_id.clone(),
            receiver_id: self.receiver_id.clone(),
            is_typing,
        };
        match self.transport.emit(client_events::TYPING, &payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("typing signal not sent: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{drain_emitted, ReconnectConfig, TransportKind};
    use serde_json::{json, Value};

    fn connected() -> (TransportManager, futures_channel::mpsc::UnboundedReceiver<crate::ws::Outbound>) {
        let t = TransportManager::new("http://127.0.0.1:9", ReconnectConfig::default(), TransportKind::default_order());
        let rx = t.attach_loopback("U1");
        (t, rx)
    }

    fn flags(sent: Vec<(String, Value)>) -> Vec<bool> {
        sent.into_iter()
            .filter(|(name, _)| name == "typing")
            .map(|(_, p)| p["isTyping"].as_bool().unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn leading_and_trailing_edges_only() {
        let (t, mut rx) = connected();
        let typing = TypingIndicator::new(t, "U1", "O1");

        typing.input_changed("h");
        tokio::time::sleep(Duration::from_millis(500)).await;
        typing.input_changed("he");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        typing.input_changed("hel");

        assert_eq!(flags(drain_emitted(&mut rx)), vec![true]);
        assert!(typing.is_typing());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(drain_emitted(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(flags(drain_emitted(&mut rx)), vec![false]);
        assert!(!typing.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_the_timer() {
        let (t, mut rx) = connected();
        let typing = TypingIndicator::new(t, "U1", "O1");

        typing.input_changed("hi");
        typing.input_changed("");
        tokio::time::sleep(Duration::from_secs(5)).await;

        let sent = drain_emitted(&mut rx);
        assert_eq!(flags(sent.clone()), vec![true, false]);
        assert_eq!(
            sent[0].1,
            json!({"userId": "U1", "receiverId": "O1", "isTyping": true})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_keystrokes_retry_the_leading_edge() {
        let t = TransportManager::new("http://127.0.0.1:9", ReconnectConfig::default(), TransportKind::default_order());
        let typing = TypingIndicator::new(t.clone(), "U1", "O1");

        typing.input_changed("h");
        assert!(!typing.is_typing());

        let mut rx = t.attach_loopback("U1");
        typing.input_changed("he");
        assert_eq!(flags(drain_emitted(&mut rx)), vec![true]);
    }
}
