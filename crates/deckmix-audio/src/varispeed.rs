//! Variable-ratio resampler for playback speed.
//!
//! Linear interpolation between two held source frames with a fractional
//! phase. The ratio is read per call, so it can change every block; the held
//! frames and phase carry over across seeks and are cleared by [`Varispeed::reset`].

/// Sequential supplier of stereo frames.
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<[f32; 2]>;
}

/// Interpolating resampler state.
#[derive(Debug, Clone, Default)]
pub struct Varispeed {
    prev: [f32; 2],
    next: [f32; 2],
    /// Position between `prev` and `next`, in [0, 1).
    phase: f64,
    primed: bool,
}

impl Varispeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the held frames and phase.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub const fn is_primed(&self) -> bool {
        self.primed
    }

    /// Fill interleaved stereo `out`, consuming `ratio` source frames per
    /// output frame.
    ///
    /// Returns the number of frames produced before `source` ran dry; the
    /// rest of `out` is zeroed. Never allocates.
    pub fn process<S: FrameSource>(
        &mut self,
        ratio: f64,
        source: &mut S,
        out: &mut [f32],
    ) -> usize {
        let mut produced = 0;

        for frame in out.chunks_exact_mut(2) {
            if !self.primed && !self.prime(source) {
                break;
            }

            #[allow(clippy::cast_possible_truncation)]
            let t = self.phase as f32;
            frame[0] = self.prev[0] + (self.next[0] - self.prev[0]) * t;
            frame[1] = self.prev[1] + (self.next[1] - self.prev[1]) * t;
            produced += 1;

            self.phase += ratio;
            if !self.advance(source) {
                break;
            }
        }

        out[produced * 2..].fill(0.0);
        produced
    }

    fn prime<S: FrameSource>(&mut self, source: &mut S) -> bool {
        let Some(first) = source.next_frame() else {
            return false;
        };
        self.prev = first;
        self.next = source.next_frame().unwrap_or([0.0; 2]);
        self.phase = 0.0;
        self.primed = true;
        true
    }

    /// Step the held frames forward past every whole unit of phase.
    fn advance<S: FrameSource>(&mut self, source: &mut S) -> bool {
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.prev = self.next;
            match source.next_frame() {
                Some(frame) => self.next = frame,
                None => {
                    self.primed = false;
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    /// Ramp source: frame n is (n, -n).
    struct Ramp {
        next: usize,
        len: usize,
    }

    impl Ramp {
        fn new(len: usize) -> Self {
            Self { next: 0, len }
        }
    }

    impl FrameSource for Ramp {
        #[allow(clippy::cast_precision_loss)]
        fn next_frame(&mut self) -> Option<[f32; 2]> {
            if self.next >= self.len {
                return None;
            }
            let v = self.next as f32;
            self.next += 1;
            Some([v, -v])
        }
    }

    #[test]
    fn test_unity_ratio_passes_frames_through() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(100);
        let mut out = [0.0f32; 8];
        assert_eq!(varispeed.process(1.0, &mut source, &mut out), 4);
        assert_eq!(out, [0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }

    #[test]
    fn test_half_speed_interpolates() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(100);
        let mut out = [0.0f32; 8];
        varispeed.process(0.5, &mut source, &mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_double_speed_skips() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(100);
        let mut out = [0.0f32; 8];
        varispeed.process(2.0, &mut source, &mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_ratio_change_between_blocks_is_continuous() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(100);
        let mut first = [0.0f32; 8];
        let mut second = [0.0f32; 8];
        varispeed.process(1.0, &mut source, &mut first);
        varispeed.process(0.5, &mut source, &mut second);
        // Picks up right after frame 3
        assert_eq!(second[0], 4.0);
        assert_eq!(second[2], 4.5);
    }

    #[test]
    fn test_exhaustion_zero_fills() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(3);
        let mut out = [9.0f32; 12];
        let produced = varispeed.process(1.0, &mut source, &mut out);
        assert!(produced <= 3);
        assert!(out[produced * 2..].iter().all(|s| *s == 0.0));
        assert!(!varispeed.is_primed());
    }

    #[test]
    fn test_zero_ratio_holds_position() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(10);
        let mut out = [0.0f32; 8];
        assert_eq!(varispeed.process(0.0, &mut source, &mut out), 4);
        assert_eq!(source.next, 2);
        assert!(out.iter().step_by(2).all(|s| *s == 0.0));
    }

    #[test]
    fn test_empty_source_produces_silence() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(0);
        let mut out = [1.0f32; 4];
        assert_eq!(varispeed.process(1.0, &mut source, &mut out), 0);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut varispeed = Varispeed::new();
        let mut source = Ramp::new(10);
        let mut out = [0.0f32; 4];
        varispeed.process(0.5, &mut source, &mut out);
        assert!(varispeed.is_primed());
        varispeed.reset();
        assert!(!varispeed.is_primed());
    }
}
