//! Lock-free parameter handoff between the control and audio threads.
//!
//! Each deck parameter is a single atomic word. The control thread stores,
//! the audio thread loads once per block; neither side can block the other.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An `f64` stored in an `AtomicU64`.
#[derive(Debug)]
pub struct ParamCell(AtomicU64);

impl ParamCell {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Replace `current` with `new` unless another thread changed it first.
    ///
    /// Compares bit patterns, so it only succeeds against a value previously
    /// read from this cell.
    #[inline]
    pub fn compare_exchange(&self, current: f64, new: f64) -> bool {
        self.0
            .compare_exchange(
                current.to_bits(),
                new.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Per-deck state shared by the control half and the render half.
#[derive(Debug)]
pub struct DeckParams {
    /// Output gain, 0.0 to 1.0.
    pub gain: ParamCell,
    /// Resampling ratio, 0.0 to 100.0.
    pub speed: ParamCell,
    /// Stereo width ("vocal mix"), 0.0 to 1.0.
    pub width: ParamCell,
    /// Read cursor into the loaded track, in engine-rate frames.
    pub playhead: ParamCell,
    /// Frames in the loaded track, 0 when nothing is loaded.
    pub length: AtomicU64,
    pub playing: AtomicBool,
    /// Bumped on every track install.
    pub generation: AtomicU64,
}

impl Default for DeckParams {
    fn default() -> Self {
        Self {
            gain: ParamCell::new(1.0),
            speed: ParamCell::new(1.0),
            width: ParamCell::new(0.5),
            playhead: ParamCell::new(0.0),
            length: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }
}

impl DeckParams {
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_playing(&self, playing: bool) -> bool {
        self.playing.swap(playing, Ordering::AcqRel)
    }

    #[inline]
    pub fn length_frames(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_length_frames(&self, frames: u64) {
        self.length.store(frames, Ordering::Release);
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark a new track install. Must happen before the playhead is reset.
    #[inline]
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
