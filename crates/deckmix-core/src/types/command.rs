//! Typed commands accepted by the engine.

use serde::{Deserialize, Serialize};

use super::DeckId;

/// Commands sent from the UI side into the engine.
///
/// Every widget interaction maps onto one of these, so the engine never
/// knows which toolkit produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Load a track onto a deck. Transport stops and the position resets.
    Load { deck: DeckId, locator: String },
    /// Set a deck's output gain directly (0.0 to 1.0).
    SetGain { deck: DeckId, value: f64 },
    /// Set a music deck's volume fader (0.0 to 1.0); feeds the gain law.
    SetVolume { deck: DeckId, value: f64 },
    /// Set the crossfader (0.0 = full left, 1.0 = full right).
    SetCrossfade { value: f64 },
    /// Set the resampling ratio (0.0 to 100.0).
    SetSpeed { deck: DeckId, value: f64 },
    /// Set the stereo width, clamped to 0.0 to 1.0.
    SetStereoWidth { deck: DeckId, value: f64 },
    /// Seek to an absolute position in seconds.
    Seek { deck: DeckId, seconds: f64 },
    /// Seek to a fraction (0.0 to 1.0) of the track length.
    SeekRelative { deck: DeckId, fraction: f64 },
    /// Start playback.
    Start { deck: DeckId },
    /// Stop playback.
    Stop { deck: DeckId },
    /// Pointer went down on the platter at `angle` radians.
    BeginScratch { deck: DeckId, angle: f64 },
    /// Pointer moved to `angle` radians while dragging.
    UpdateScratch { deck: DeckId, angle: f64 },
    /// Pointer released.
    EndScratch { deck: DeckId },
    /// Include or exclude a deck from the output bus.
    SetDeckEnabled { deck: DeckId, enabled: bool },
    /// Fire a one-shot sample from the pad bank on the auxiliary deck.
    TriggerPad { pad: usize },
}

impl Command {
    /// The deck this command targets, if it targets a single deck.
    pub const fn deck(&self) -> Option<DeckId> {
        match self {
            Self::Load { deck, .. }
            | Self::SetGain { deck, .. }
            | Self::SetVolume { deck, .. }
            | Self::SetSpeed { deck, .. }
            | Self::SetStereoWidth { deck, .. }
            | Self::Seek { deck, .. }
            | Self::SeekRelative { deck, .. }
            | Self::Start { deck }
            | Self::Stop { deck }
            | Self::BeginScratch { deck, .. }
            | Self::UpdateScratch { deck, .. }
            | Self::EndScratch { deck }
            | Self::SetDeckEnabled { deck, .. } => Some(*deck),
            Self::TriggerPad { .. } => Some(DeckId::Aux),
            Self::SetCrossfade { .. } => None,
        }
    }
}
