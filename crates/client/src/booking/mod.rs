//! Booking submission and booking lifecycle notifications.

mod ledger;
mod router;
mod submitter;

pub use ledger::OutcomeLedger;
pub use router::{BookingEventRouter, BookingHandlers, Subscription};
pub use submitter::BookingSubmitter;
