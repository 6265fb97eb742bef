//! Chat sessions over the shared realtime connection.

mod session;
mod typing;

pub use session::{ChatEvent, ChatSession, ChatSnapshot, Participants};
pub use typing::{TypingIndicator, TYPING_IDLE};
