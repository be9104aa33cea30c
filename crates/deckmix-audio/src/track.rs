//! Fully decoded, rate-converted tracks ready for the audio thread.

use deckmix_core::{Error, Result};
use tracing::{debug, info};

use crate::decode::{DecodeStream, DecoderAdapter};
use crate::resample::RateConverter;

/// Frames pulled from a decode stream per read.
const READ_FRAMES: usize = 4096;

/// Interleaved stereo audio at the engine rate.
///
/// Built on the loading thread; the audio thread only reads it.
#[derive(Debug)]
pub struct Track {
    locator: String,
    samples: Box<[f32]>,
    sample_rate: u32,
    source_rate: u32,
    source_channels: usize,
}

impl Track {
    /// Open `locator` through `adapter` and decode it completely.
    pub fn load(adapter: &dyn DecoderAdapter, locator: &str, sample_rate: u32) -> Result<Self> {
        let mut stream = adapter.open(locator)?;
        Self::decode(stream.as_mut(), locator, sample_rate)
    }

    /// Drain `stream` into a stereo track at `sample_rate`.
    pub fn decode(stream: &mut dyn DecodeStream, locator: &str, sample_rate: u32) -> Result<Self> {
        let source_rate = stream.sample_rate();
        let source_channels = stream.channels();
        if source_channels == 0 {
            return Err(Error::UnsupportedFormat(format!(
                "{locator} reports no audio channels"
            )));
        }

        let mut interleaved = Vec::new();
        let mut chunk = Vec::with_capacity(READ_FRAMES * source_channels);
        loop {
            chunk.clear();
            if stream.read(READ_FRAMES, &mut chunk)? == 0 {
                break;
            }
            append_stereo(&chunk, source_channels, &mut interleaved);
        }

        if interleaved.is_empty() {
            return Err(Error::AudioDecode(format!("{locator} contains no audio")));
        }

        let mut converter = RateConverter::new(source_rate, sample_rate, 2)?;
        let samples = converter.convert_all(&interleaved)?;

        let track = Self {
            locator: locator.to_string(),
            samples: samples.into_boxed_slice(),
            sample_rate,
            source_rate,
            source_channels,
        };

        if let Some(reported) = stream.duration_seconds() {
            debug!(
                "{}: reported {:.3}s, decoded {:.3}s",
                locator,
                reported,
                track.duration_seconds()
            );
        }
        info!(
            "Decoded {} ({} Hz, {} ch) to {} frames at {} Hz",
            locator,
            source_rate,
            source_channels,
            track.frames(),
            sample_rate
        );

        Ok(track)
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Number of stereo frames.
    pub const fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub const fn source_channels(&self) -> usize {
        self.source_channels
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Stereo frame at `index`, or `None` past the end.
    #[inline]
    pub fn frame(&self, index: usize) -> Option<[f32; 2]> {
        let i = index.checked_mul(2)?;
        let left = *self.samples.get(i)?;
        let right = *self.samples.get(i + 1)?;
        Some([left, right])
    }
}

/// Fold any channel layout onto stereo: mono is duplicated, extra channels
/// beyond the first two are dropped.
fn append_stereo(chunk: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.reserve(chunk.len() / channels * 2);
    for frame in chunk.chunks_exact(channels) {
        match frame {
            [mono] => out.extend_from_slice(&[*mono, *mono]),
            [left, right, ..] => out.extend_from_slice(&[*left, *right]),
            [] => {}
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]

    use super::*;
    use crate::decode::{Clip, MemoryAdapter, MemoryStream};

    #[test]
    fn test_mono_is_duplicated() {
        let mut stream = MemoryStream::new(Clip::new(48000, 1, vec![0.1, 0.2, 0.3]));
        let track = Track::decode(&mut stream, "mono", 48000).unwrap();
        assert_eq!(track.frames(), 3);
        assert_eq!(track.frame(1), Some([0.2, 0.2]));
        assert_eq!(track.frame(3), None);
    }

    #[test]
    fn test_extra_channels_dropped() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut stream = MemoryStream::new(Clip::new(48000, 3, samples));
        let track = Track::decode(&mut stream, "surround", 48000).unwrap();
        assert_eq!(track.frames(), 2);
        assert_eq!(track.frame(0), Some([1.0, 2.0]));
        assert_eq!(track.frame(1), Some([4.0, 5.0]));
    }

    #[test]
    fn test_duration_at_engine_rate() {
        let adapter = MemoryAdapter::new();
        adapter.insert("second", Clip::constant(48000, 2, 48000, 0.5));
        let track = Track::load(&adapter, "second", 48000).unwrap();
        assert!((track.duration_seconds() - 1.0).abs() < 1e-9);
        assert_eq!(track.locator(), "second");
        assert_eq!(track.source_channels(), 2);
    }

    #[test]
    fn test_rate_conversion_on_load() {
        let adapter = MemoryAdapter::new();
        adapter.insert("half", Clip::constant(24000, 2, 24000, 0.5));
        let track = Track::load(&adapter, "half", 48000).unwrap();
        assert_eq!(track.source_rate(), 24000);
        assert_eq!(track.frames(), 48000);
    }

    #[test]
    fn test_rate_conversion_keeps_onset() {
        // Silent first half, 0.5 second half, at half the engine rate
        let samples = (0..24000)
            .map(|i| if i < 12000 { 0.0 } else { 0.5 })
            .collect();
        let adapter = MemoryAdapter::new();
        adapter.insert("step", Clip::new(24000, 1, samples));

        let track = Track::load(&adapter, "step", 48000).unwrap();
        let onset = (0..track.frames())
            .position(|i| track.frame(i).unwrap()[0] > 0.25)
            .unwrap();
        assert!(onset.abs_diff(24000) <= 4, "onset at {onset}");
    }

    #[test]
    fn test_empty_stream_rejected() {
        let mut stream = MemoryStream::new(Clip::new(48000, 2, Vec::new()));
        assert!(Track::decode(&mut stream, "empty", 48000).is_err());
    }
}
