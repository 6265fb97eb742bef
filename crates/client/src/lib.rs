//! Luci client core
//!
//! Booking submission, booking lifecycle notifications and realtime chat
//! against the Luci backend. The presentation layer sits on top of these
//! types and is not part of this crate.

pub mod api_client;
pub mod booking;
pub mod chat;
pub mod config;
pub mod identity;
pub mod inbox;
pub mod recommendations;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use booking::{BookingEventRouter, BookingHandlers, BookingSubmitter, OutcomeLedger, Subscription};
pub use chat::{ChatEvent, ChatSession, Participants, TypingIndicator};
pub use config::ClientConfig;
pub use identity::{IdentityStore, StaticIdentityStore};
pub use storage::{SessionStore, Storage};
pub use ws::{ConnectionState, TransportManager};
