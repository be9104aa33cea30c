//! Sample-rate conversion using rubato.
//!
//! Runs on the loading thread only: each track is converted to the engine
//! rate once, before it is handed to the audio thread.

use deckmix_core::{Error, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;

/// Frames fed to rubato per chunk.
const CHUNK_SIZE: usize = 1024;

/// Fixed-ratio converter from a track's native rate to the engine rate.
pub struct RateConverter {
    resampler: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved input waiting for a full chunk.
    input_buffer: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter. Equal rates make it a passthrough.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(Error::Resample(format!(
                "Invalid conversion {input_rate}Hz -> {output_rate}Hz with {channels} channels"
            )));
        }

        let resampler = if input_rate == output_rate {
            None
        } else {
            let resampler = FftFixedIn::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_SIZE,
                2,
                channels,
            )
            .map_err(|e| Error::Resample(format!("Failed to create resampler: {e}")))?;

            debug!(
                "Rate converter created: {}Hz -> {}Hz, {} channels",
                input_rate, output_rate, channels
            );
            Some(resampler)
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
        })
    }

    /// Check if resampling is needed.
    pub const fn needs_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Convert a whole interleaved signal in one go.
    ///
    /// The resampler's output delay is trimmed from the front and its tail
    /// is flushed out, so frame `n` of the input lines up with frame
    /// `n * output_rate / input_rate` of the output.
    pub fn convert_all(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(delay) = self.resampler.as_ref().map(|r| r.output_delay()) else {
            return Ok(input.to_vec());
        };

        let expected = self.output_frames_for(input.len() / self.channels) * self.channels;
        let delay = delay * self.channels;

        let mut output = self.process(input)?;
        while output.len() < delay + expected {
            let tail = self.flush_padded()?;
            if tail.is_empty() {
                break;
            }
            output.extend(tail);
        }

        output.drain(..delay.min(output.len()));
        output.truncate(expected);
        Ok(output)
    }

    /// Output frames that `input_frames` frames convert to.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn output_frames_for(&self, input_frames: usize) -> usize {
        (input_frames as f64 * f64::from(self.output_rate) / f64::from(self.input_rate)).round()
            as usize
    }

    /// Resample every full chunk of `input`, holding back the remainder.
    fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.deinterleave(input);

        let mut all_output = Vec::new();
        while self.input_buffer[0].len() >= CHUNK_SIZE {
            let chunk: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_SIZE).collect())
                .collect();

            let resampled = self.run(&chunk)?;
            self.interleave_into(&resampled, &mut all_output);
        }

        Ok(all_output)
    }

    /// Run the held remainder, zero-padded to a full chunk.
    fn flush_padded(&mut self) -> Result<Vec<f32>> {
        let chunk: Vec<Vec<f32>> = self
            .input_buffer
            .iter_mut()
            .map(|ch| {
                let mut data: Vec<f32> = std::mem::take(ch);
                data.resize(CHUNK_SIZE, 0.0);
                data
            })
            .collect();

        let resampled = self.run(&chunk)?;
        let mut output = Vec::new();
        self.interleave_into(&resampled, &mut output);
        Ok(output)
    }

    fn run(&mut self, chunk: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let Some(resampler) = &mut self.resampler else {
            return Ok(chunk.to_vec());
        };
        resampler
            .process(chunk, None)
            .map_err(|e| Error::Resample(format!("Resample failed: {e}")))
    }

    /// Deinterleave input samples into channel buffers.
    fn deinterleave(&mut self, input: &[f32]) {
        for frame in input.chunks_exact(self.channels) {
            for (buffer, sample) in self.input_buffer.iter_mut().zip(frame) {
                buffer.push(*sample);
            }
        }
    }

    /// Interleave channel buffers onto `output`.
    fn interleave_into(&self, channels: &[Vec<f32>], output: &mut Vec<f32>) {
        let Some(first) = channels.first() else {
            return;
        };

        output.reserve(first.len() * self.channels);
        for frame in 0..first.len() {
            for ch in channels {
                output.push(ch[frame]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_no_resampling() {
        let mut converter = RateConverter::new(48000, 48000, 2).unwrap();
        assert!(!converter.needs_resampling());

        let input = vec![0.5f32; 2048];
        let output = converter.convert_all(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_converter_creation() {
        let converter = RateConverter::new(44100, 48000, 2).unwrap();
        assert!(converter.needs_resampling());
        assert_eq!(converter.input_rate(), 44100);
        assert_eq!(converter.output_rate(), 48000);
        assert_eq!(converter.channels(), 2);
    }

    #[test]
    fn test_invalid_rates_rejected() {
        assert!(RateConverter::new(0, 48000, 2).is_err());
        assert!(RateConverter::new(44100, 48000, 0).is_err());
    }

    #[test]
    fn test_upsampling_length() {
        let mut converter = RateConverter::new(24000, 48000, 2).unwrap();
        let input = vec![0.25f32; 24000 * 2];
        let output = converter.convert_all(&input).unwrap();
        assert_eq!(output.len(), 48000 * 2);
    }

    /// Half a second of silence then half a second at 0.5.
    fn step_signal(rate: usize) -> Vec<f32> {
        (0..rate)
            .flat_map(|i| {
                let v = if i < rate / 2 { 0.0 } else { 0.5 };
                [v, v]
            })
            .collect()
    }

    fn onset_frame(samples: &[f32]) -> usize {
        samples
            .chunks_exact(2)
            .position(|frame| frame[0] > 0.25)
            .unwrap()
    }

    #[test]
    fn test_conversion_keeps_timing() {
        let mut converter = RateConverter::new(24000, 48000, 2).unwrap();
        let output = converter.convert_all(&step_signal(24000)).unwrap();

        assert_eq!(output.len(), 48000 * 2);
        let onset = onset_frame(&output);
        assert!(onset.abs_diff(24000) <= 4, "onset at {onset}");
    }

    #[test]
    fn test_conversion_keeps_tail() {
        let mut converter = RateConverter::new(44100, 48000, 2).unwrap();
        let output = converter.convert_all(&step_signal(44100)).unwrap();

        let frames = output.len() / 2;
        assert_eq!(frames, 48000);
        // The last real frames survive instead of being cut by the delay
        let near_end = &output[(frames - 200) * 2..(frames - 100) * 2];
        assert!(near_end.iter().all(|s| (*s - 0.5).abs() < 0.05));
    }
}
