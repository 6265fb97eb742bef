//! Helper for handlers that must act on each booking outcome once.

use std::collections::HashSet;
use std::sync::Arc;

use luci_shared::BookingOutcome;
use parking_lot::Mutex;

/// Remembers which bookings have already reached a terminal outcome.
///
/// Cheap to clone; clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct OutcomeLedger {
    settled: Arc<Mutex<HashSet<String>>>,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a terminal outcome for a booking is seen,
    /// false for repeats. Non-terminal outcomes always pass.
    pub fn first_time(&self, outcome: &BookingOutcome) -> bool {
        if !outcome.is_terminal() {
            return true;
        }
        match outcome.booking_id() {
            Some(id) => self.settled.lock().insert(id.to_string()),
            None => true,
        }
    }

    pub fn is_settled(&self, booking_id: &str) -> bool {
        self.settled.lock().contains(booking_id)
    }

    pub fn forget(&self, booking_id: &str) {
        self.settled.lock().remove(booking_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn accepted(id: &str) -> BookingOutcome {
        BookingOutcome::Accepted {
            booking_id: id.into(),
            conversation_id: format!("conv-{id}"),
            salon_owner_id: None,
            booking: Value::Null,
        }
    }

    #[test]
    fn repeated_acceptance_is_recognised() {
        let ledger = OutcomeLedger::new();
        assert!(ledger.first_time(&accepted("B1")));
        assert!(!ledger.first_time(&accepted("B1")));
        assert!(ledger.first_time(&accepted("B2")));
        assert!(ledger.is_settled("B1"));

        ledger.forget("B1");
        assert!(ledger.first_time(&accepted("B1")));
    }

    #[test]
    fn status_updates_always_pass() {
        let ledger = OutcomeLedger::new();
        let update = BookingOutcome::StatusUpdate {
            booking_id: "B1".into(),
            status: "pending".into(),
            booking: Value::Null,
        };
        assert!(ledger.first_time(&update));
        assert!(ledger.first_time(&update));
    }
}
