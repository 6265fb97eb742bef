//! The recommendation deck the user swipes through.
//!
//! Async steps (a booking submission finishing, a reload) read the deck
//! through a shared handle at the moment they run, never through a copy
//! captured when they started.

use std::sync::Arc;

use luci_shared::{SalonSelection, Studio};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct DeckState {
    cards: Vec<Studio>,
    index: usize,
    exhausted: bool,
}

impl DeckState {
    fn advance(&mut self) {
        if self.cards.is_empty() {
            return;
        }
        if self.index + 1 >= self.cards.len() {
            self.exhausted = true;
        } else {
            self.index += 1;
        }
    }
}

/// Shared handle to the current cards and position.
#[derive(Debug, Clone, Default)]
pub struct RecommendationDeck {
    state: Arc<RwLock<DeckState>>,
}

impl RecommendationDeck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh batch and rewind to the first card.
    pub fn replace(&self, cards: Vec<Studio>) {
        let mut state = self.state.write();
        state.cards = cards;
        state.index = 0;
        state.exhausted = false;
    }

    pub fn current(&self) -> Option<Studio> {
        let state = self.state.read();
        if state.exhausted {
            return None;
        }
        state.cards.get(state.index).cloned()
    }

    pub fn index(&self) -> usize {
        self.state.read().index
    }

    pub fn len(&self) -> usize {
        self.state.read().cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().cards.is_empty()
    }

    /// True once the last card has been swiped; a reload is needed.
    pub fn is_exhausted(&self) -> bool {
        self.state.read().exhausted
    }

    /// Take the current card as a booking selection and move on.
    pub fn swipe_right(&self) -> Option<SalonSelection> {
        let mut state = self.state.write();
        if state.exhausted {
            return None;
        }
        let selection = state.cards.get(state.index).map(Studio::to_selection);
        state.advance();
        selection
    }

    /// Skip the current card.
    pub fn swipe_left(&self) {
        let mut state = self.state.write();
        if !state.exhausted {
            state.advance();
        }
    }
}
