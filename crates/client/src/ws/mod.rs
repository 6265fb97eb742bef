//! Realtime transport for the chat backend.
//!
//! One [`TransportManager`] owns the Engine.IO session of the signed-in
//! user. The booking router and chat sessions never open their own
//! connection; they register listeners and emit through the manager.
//!
//! ```text
//!   BookingEventRouter   ChatSession   ChatSession
//!            │                │             │
//!            └──── on / emit ─┴─────────────┘
//!                         │
//!                 TransportManager ── reconnect loop, listener registry
//!                         │
//!                       Link ───────── websocket | polling
//! ```

mod connection;
mod link;
mod manager;

pub use connection::{ConnectionState, ReconnectConfig, TransportKind};
pub use manager::{EventHandler, ListenerId, TransportManager};

#[cfg(test)]
pub(crate) use manager::{drain_emitted, Outbound};
