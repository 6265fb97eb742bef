//! Shared types for the Luci booking and chat client and its services.

pub mod error;
pub mod models;
pub mod packet;
pub mod protocol;
pub mod shape;

pub use error::*;
pub use models::*;
pub use packet::{EnginePacket, OpenHandshake, SocketPacket};
pub use protocol::*;
