//! Audio output using cpal.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use deckmix_core::{Error, Result};
use tracing::{debug, error, info};

use crate::engine::Renderer;

/// Audio output stream configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub max_block_frames: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            max_block_frames: 4096,
        }
    }
}

/// A running output stream pulling from a [`Renderer`].
///
/// The stream stops when this is dropped. `cpal::Stream` is not `Send` on
/// every platform, so keep this on the thread that created it.
pub struct AudioOutput {
    _stream: Stream,
    config: OutputConfig,
    device_name: String,
}

impl AudioOutput {
    /// Start the default output device, rendering from `renderer`.
    pub fn start(renderer: Renderer) -> Result<Self> {
        let device = default_device()?;
        Self::with_device(device, renderer)
    }

    /// Start a specific output device.
    #[allow(clippy::needless_pass_by_value)] // Device is typically moved
    pub fn with_device(device: Device, renderer: Renderer) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;
        debug!("Supported output config: {:?}", supported_config);

        let sample_format = supported_config.sample_format();
        let mut config: StreamConfig = supported_config.into();
        // Tracks are converted to the engine rate on load; the device follows it
        if config.sample_rate.0 != renderer.sample_rate() {
            debug!(
                "Device prefers {} Hz, opening at {} Hz",
                config.sample_rate.0,
                renderer.sample_rate()
            );
            config.sample_rate = cpal::SampleRate(renderer.sample_rate());
        }

        let output_config = OutputConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            ..OutputConfig::default()
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, &output_config, renderer)?
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, &output_config, renderer)?
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, &output_config, renderer)?
            }
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        info!(
            "Audio output started on {}: {} Hz, {} channels",
            device_name, output_config.sample_rate, output_config.channels
        );

        Ok(Self {
            _stream: stream,
            config: output_config,
            device_name,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &Device,
        config: &StreamConfig,
        output_config: &OutputConfig,
        mut renderer: Renderer,
    ) -> Result<Stream> {
        let channels = usize::from(config.channels).max(1);
        let mut mix = vec![0.0f32; output_config.max_block_frames * 2];

        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames_per_pass = mix.len() / 2;
                    for device_block in data.chunks_mut(frames_per_pass * channels) {
                        let frames = device_block.len() / channels;
                        let stereo = &mut mix[..frames * 2];
                        renderer.render(stereo);
                        write_frames(stereo, device_block, channels);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

        Ok(stream)
    }

    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.config.channels
    }
}

/// Spread interleaved stereo onto a device buffer with `channels` channels.
///
/// Mono devices get the average of both sides; extra channels are silent.
fn write_frames<T: cpal::Sample + cpal::FromSample<f32>>(stereo: &[f32], device: &mut [T], channels: usize) {
    for (frame, out) in stereo.chunks_exact(2).zip(device.chunks_exact_mut(channels)) {
        match out {
            [mono] => *mono = T::from_sample((frame[0] + frame[1]) * 0.5),
            [left, right, rest @ ..] => {
                *left = T::from_sample(frame[0]);
                *right = T::from_sample(frame[1]);
                for sample in rest {
                    *sample = T::from_sample(0.0f32);
                }
            }
            [] => {}
        }
    }
}

fn default_device() -> Result<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))
}

/// The default device's preferred configuration, so the engine can be built
/// at the rate the hardware runs at.
pub fn default_output_config() -> Result<OutputConfig> {
    let supported = default_device()?
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;

    Ok(OutputConfig {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
        ..OutputConfig::default()
    })
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    #[test]
    fn test_list_devices() {
        // May fail on CI without audio hardware; only checks it doesn't panic
        let _ = list_output_devices();
    }

    #[test]
    fn test_default_config() {
        let config = OutputConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_write_frames_stereo_device() {
        let mut device = [9.0f32; 4];
        write_frames(&[0.1, 0.2, 0.3, 0.4], &mut device, 2);
        assert_eq!(device, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_write_frames_mono_and_surround() {
        let mut mono = [9.0f32; 2];
        write_frames(&[0.2, 0.4, 1.0, 0.0], &mut mono, 1);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert_eq!(mono[1], 0.5);

        let mut surround = [9.0f32; 8];
        write_frames(&[0.1, 0.2, 0.3, 0.4], &mut surround, 4);
        assert_eq!(surround, [0.1, 0.2, 0.0, 0.0, 0.3, 0.4, 0.0, 0.0]);
    }

    #[test]
    fn test_write_frames_integer_device() {
        let mut device = [0i16; 2];
        write_frames(&[1.0, -1.0], &mut device, 2);
        assert!(device[0] > 32000);
        assert!(device[1] < -32000);
    }
}
