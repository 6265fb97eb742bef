//! Routes booking lifecycle pushes to caller-supplied handlers.

use std::sync::Arc;

use luci_shared::{server_events, BookingOutcome};
use parking_lot::Mutex;
use serde_json::Value;

use crate::ws::{ListenerId, TransportManager};

type Handler = Arc<dyn Fn(BookingOutcome) + Send + Sync>;

/// One optional handler per outcome kind. Outcomes without a handler are
/// dropped after logging.
#[derive(Clone, Default)]
pub struct BookingHandlers {
    on_accepted: Option<Handler>,
    on_rejected: Option<Handler>,
    on_chat_room_created: Option<Handler>,
    on_status_update: Option<Handler>,
}

impl BookingHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_accepted(mut self, f: impl Fn(BookingOutcome) + Send + Sync + 'static) -> Self {
        self.on_accepted = Some(Arc::new(f));
        self
    }

    pub fn on_rejected(mut self, f: impl Fn(BookingOutcome) + Send + Sync + 'static) -> Self {
        self.on_rejected = Some(Arc::new(f));
        self
    }

    pub fn on_chat_room_created(mut self, f: impl Fn(BookingOutcome) + Send + Sync + 'static) -> Self {
        self.on_chat_room_created = Some(Arc::new(f));
        self
    }

    pub fn on_status_update(mut self, f: impl Fn(BookingOutcome) + Send + Sync + 'static) -> Self {
        self.on_status_update = Some(Arc::new(f));
        self
    }

    fn handler_for(&self, outcome: &BookingOutcome) -> Option<&Handler> {
        match outcome {
            BookingOutcome::Accepted { .. } => self.on_accepted.as_ref(),
            BookingOutcome::Rejected { .. } => self.on_rejected.as_ref(),
            BookingOutcome::ChatRoomCreated { .. } => self.on_chat_room_created.as_ref(),
            BookingOutcome::StatusUpdate { .. } => self.on_status_update.as_ref(),
        }
    }

    /// Decode one push and call exactly one handler. Malformed pushes are
    /// logged and dropped.
    fn route(&self, event: &str, payload: &Value) {
        match BookingOutcome::from_push(event, payload) {
            Ok(outcome) => match self.handler_for(&outcome) {
                Some(handler) => {
                    tracing::debug!(event, booking_id = outcome.booking_id().unwrap_or("?"), "booking push");
                    handler(outcome);
                }
                None => tracing::debug!(event, "no handler for booking outcome"),
            },
            Err(e) => tracing::warn!(event, "dropping booking push: {}", e),
        }
    }
}

/// Listener registrations owned by one `subscribe` call.
pub struct Subscription {
    transport: TransportManager,
    listeners: Mutex<Vec<ListenerId>>,
}

impl Subscription {
    /// Stop this subscription's handlers. The shared connection stays open.
    /// Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        for id in self.listeners.lock().drain(..) {
            self.transport.off_listener(id);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.listeners.lock().is_empty()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Translates booking lifecycle pushes into [`BookingOutcome`]s.
///
/// The router does not deduplicate: a repeated push produces a repeated
/// handler call. Handlers that must be idempotent can use
/// [`OutcomeLedger`](super::OutcomeLedger).
#[derive(Clone)]
pub struct BookingEventRouter {
    transport: TransportManager,
}

impl BookingEventRouter {
    pub fn new(transport: TransportManager) -> Self {
        Self { transport }
    }

    /// Ensure the connection for `user_id` and register `handlers` for every
    /// booking lifecycle event.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, user_id: &str, handlers: BookingHandlers) -> Subscription {
        self.transport.connect(user_id);

        let handlers = Arc::new(handlers);
        let listeners = server_events::BOOKING_LIFECYCLE
            .iter()
            .map(|event| {
                let handlers = handlers.clone();
                let name = event.to_string();
                self.transport
                    .on(event, move |payload| handlers.route(&name, payload))
            })
            .collect();

        tracing::info!(user_id, "subscribed to booking events");
        Subscription {
            transport: self.transport.clone(),
            listeners: Mutex::new(listeners),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{ReconnectConfig, TransportKind};
    use serde_json::json;

    fn transport() -> TransportManager {
        TransportManager::new("http://127.0.0.1:9", ReconnectConfig::default(), TransportKind::default_order())
    }

    fn recorder() -> (Arc<Mutex<Vec<BookingOutcome>>>, impl Fn(BookingOutcome) + Send + Sync + Clone + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |o| sink.lock().push(o))
    }

    fn router_with(t: &TransportManager, handlers: BookingHandlers) -> Subscription {
        // Pretend the session is already live so subscribe does not dial out
        let _outbound = t.attach_loopback("U1");
        BookingEventRouter::new(t.clone()).subscribe("U1", handlers)
    }

    #[tokio::test]
    async fn accepted_push_reaches_its_handler_once() {
        let t = transport();
        let (seen, sink) = recorder();
        let _sub = router_with(&t, BookingHandlers::new().on_accepted(sink));

        t.inject(
            "booking_accepted",
            json!({
                "bookingId": "B1",
                "conversationId": "C1",
                "booking": {"salonOwnerID": "O-nested"},
                "reciever": {"salonOwnerID": "O-reciever"}
            }),
        );

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            BookingOutcome::Accepted { booking_id, conversation_id, salon_owner_id, .. } => {
                assert_eq!(booking_id, "B1");
                assert_eq!(conversation_id, "C1");
                assert_eq!(salon_owner_id.as_deref(), Some("O-nested"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_push_is_not_deduplicated() {
        let t = transport();
        let (seen, sink) = recorder();
        let _sub = router_with(&t, BookingHandlers::new().on_accepted(sink));

        let push = json!({"bookingId": "B1", "conversationId": "C1"});
        t.inject("booking_accepted", push.clone());
        t.inject("booking_accepted", push);
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn malformed_push_is_dropped_and_listener_survives() {
        let t = transport();
        let (seen, sink) = recorder();
        let _sub = router_with(&t, BookingHandlers::new().on_accepted(sink.clone()).on_rejected(sink));

        t.inject("booking_accepted", json!({"bookingId": "B1"}));
        t.inject("booking_rejected", json!("not even an object"));
        t.inject("booking_rejected", json!({"bookingId": "B2"}));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], BookingOutcome::Rejected { booking_id, .. } if booking_id == "B2"));
    }

    #[tokio::test]
    async fn notification_routes_by_type() {
        let t = transport();
        let (accepted, on_accepted) = recorder();
        let (updates, on_update) = recorder();
        let _sub = router_with(
            &t,
            BookingHandlers::new().on_accepted(on_accepted).on_status_update(on_update),
        );

        t.inject(
            "booking_notification",
            json!({"type": "accepted", "bookingId": "B1", "conversationId": "C1"}),
        );
        t.inject(
            "booking_notification",
            json!({"status": "rescheduled", "bookingId": "B1"}),
        );
        assert_eq!(accepted.lock().len(), 1);
        assert_eq!(updates.lock().len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_its_own_listeners() {
        let t = transport();
        let (first_seen, first) = recorder();
        let (second_seen, second) = recorder();
        let first_sub = router_with(&t, BookingHandlers::new().on_rejected(first));
        let router = BookingEventRouter::new(t.clone());
        let _second_sub = router.subscribe("U1", BookingHandlers::new().on_rejected(second));
        assert_eq!(t.listener_count("booking_rejected"), 2);

        first_sub.unsubscribe();
        assert!(!first_sub.is_active());
        first_sub.unsubscribe();

        t.inject("booking_rejected", json!({"bookingId": "B1"}));
        assert!(first_seen.lock().is_empty());
        assert_eq!(second_seen.lock().len(), 1);
        assert!(t.is_connected());
    }

    #[tokio::test]
    async fn double_subscription_is_observable() {
        let t = transport();
        let (seen, sink) = recorder();
        let _a = router_with(&t, BookingHandlers::new().on_rejected(sink.clone()));
        let _b = BookingEventRouter::new(t.clone()).subscribe("U1", BookingHandlers::new().on_rejected(sink));

        assert_eq!(t.listener_count("booking_rejected"), 2);
        t.inject("booking_rejected", json!({"bookingId": "B1"}));
        assert_eq!(seen.lock().len(), 2);
    }
}
