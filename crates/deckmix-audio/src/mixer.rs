//! Additive mix of the deck voices into one interleaved stereo buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deckmix_core::DeckId;

use crate::deck::DeckVoice;

/// Registry of deck voices owned by the audio thread.
pub struct DeckRack {
    voices: Vec<DeckVoice>,
}

impl DeckRack {
    pub fn new(voices: Vec<DeckVoice>) -> Self {
        Self { voices }
    }

    pub fn voice_mut(&mut self, id: DeckId) -> Option<&mut DeckVoice> {
        self.voices.iter_mut().find(|voice| voice.id() == id)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

/// Shared enable flags for bus members, one per deck slot.
#[derive(Debug, Clone)]
pub struct BusRouting {
    enabled: Arc<[AtomicBool; DeckId::COUNT]>,
}

impl Default for BusRouting {
    fn default() -> Self {
        Self {
            enabled: Arc::new([
                AtomicBool::new(true),
                AtomicBool::new(true),
                AtomicBool::new(true),
            ]),
        }
    }
}

impl BusRouting {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_enabled(&self, deck: DeckId) -> bool {
        self.enabled[deck.index()].load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, deck: DeckId, enabled: bool) {
        self.enabled[deck.index()].store(enabled, Ordering::Release);
    }
}

/// Sums the enabled member decks. No limiting: the sum may exceed full scale.
pub struct MixerBus {
    members: Vec<DeckId>,
    routing: BusRouting,
    scratch: Box<[f32]>,
}

impl MixerBus {
    /// Build a bus over `members` that renders at most `max_block_frames`
    /// frames per pass. Membership is fixed from here on.
    pub fn new(members: Vec<DeckId>, routing: BusRouting, max_block_frames: usize) -> Self {
        Self {
            members,
            routing,
            scratch: vec![0.0; max_block_frames.max(1) * 2].into_boxed_slice(),
        }
    }

    pub fn members(&self) -> &[DeckId] {
        &self.members
    }

    pub fn routing(&self) -> &BusRouting {
        &self.routing
    }

    /// Mix one block of interleaved stereo into `out`, overwriting it.
    ///
    /// Any length works: requests longer than the scratch buffer are
    /// rendered in chunks. Disabled members are not pulled.
    pub fn render_block(&mut self, rack: &mut DeckRack, out: &mut [f32]) {
        out.fill(0.0);

        let chunk_len = self.scratch.len();
        for chunk in out.chunks_mut(chunk_len) {
            for &id in &self.members {
                if !self.routing.is_enabled(id) {
                    continue;
                }
                let Some(voice) = rack.voice_mut(id) else {
                    continue;
                };

                let scratch = &mut self.scratch[..chunk.len()];
                voice.render_block(scratch);
                for (sum, sample) in chunk.iter_mut().zip(scratch.iter()) {
                    *sum += *sample;
                }
            }
        }
    }
}
