//! In-memory state containers shared between async tasks.

pub mod deck;
pub mod messages;
pub mod presence;

pub use deck::RecommendationDeck;
pub use messages::ConversationMessages;
pub use presence::PeerPresence;
