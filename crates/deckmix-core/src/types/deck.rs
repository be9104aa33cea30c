//! Deck identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle naming one playback slot in the engine's deck registry.
///
/// The mixer and the command surface refer to decks only through these
/// handles; the decks themselves live in the registry owned by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckId {
    /// Left music deck, faded out as the crossfader moves right.
    Left,
    /// Right music deck, faded in as the crossfader moves right.
    Right,
    /// Auxiliary one-shot deck used by the sample pads.
    Aux,
}

impl DeckId {
    /// Number of deck slots.
    pub const COUNT: usize = 3;

    /// All deck slots in registry order.
    pub const ALL: [Self; Self::COUNT] = [Self::Left, Self::Right, Self::Aux];

    /// Index of this deck in the registry.
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Aux => 2,
        }
    }

    /// Whether this deck takes part in the crossfader gain law.
    pub const fn is_music_deck(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Aux => "aux",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_registry_order() {
        for (i, deck) in DeckId::ALL.iter().enumerate() {
            assert_eq!(deck.index(), i);
        }
    }

    #[test]
    fn test_music_decks() {
        assert!(DeckId::Left.is_music_deck());
        assert!(DeckId::Right.is_music_deck());
        assert!(!DeckId::Aux.is_music_deck());
    }

    #[test]
    fn test_display() {
        assert_eq!(DeckId::Aux.to_string(), "aux");
    }
}
