//! Decoder adapter: turns a locator into a pull-based PCM stream.
//!
//! The engine never parses containers itself. It asks a [`DecoderAdapter`]
//! for a [`DecodeStream`] and pulls interleaved f32 frames out of it on the
//! loading thread.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deckmix_core::{Error, Result};
use parking_lot::RwLock;
use symphonia::core::{
    audio::{AudioBuffer, AudioBufferRef, Signal},
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    conv::IntoSample,
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    sample::Sample,
};
use tracing::{debug, error};
use url::Url;

/// Opens decode streams for resource locators.
pub trait DecoderAdapter: Send + Sync {
    /// Open `locator` for decoding.
    fn open(&self, locator: &str) -> Result<Box<dyn DecodeStream>>;
}

/// Pull-based source of interleaved PCM frames.
pub trait DecodeStream: Send {
    /// Sample rate of the frames produced.
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count.
    fn channels(&self) -> usize;

    /// Total duration in seconds, if the container reports it.
    fn duration_seconds(&self) -> Option<f64>;

    /// Append up to `frames` interleaved frames to `out`.
    ///
    /// Returns the number of frames appended; fewer than requested near the
    /// end of the stream and 0 once it is exhausted.
    fn read(&mut self, frames: usize, out: &mut Vec<f32>) -> Result<usize>;
}

/// Adapter decoding local files (plain paths or `file://` URLs) with symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaAdapter;

impl DecoderAdapter for SymphoniaAdapter {
    fn open(&self, locator: &str) -> Result<Box<dyn DecodeStream>> {
        let path = resolve_locator(locator)?;
        Ok(Box::new(SymphoniaStream::open(&path)?))
    }
}

/// Map a locator onto a filesystem path.
pub fn resolve_locator(locator: &str) -> Result<PathBuf> {
    match Url::parse(locator) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| Error::InvalidArgument(format!("Not a local file URL: {locator}"))),
        // Single-letter schemes are Windows drive prefixes like `C:`.
        Ok(url) if url.scheme().len() > 1 => Err(Error::UnsupportedFormat(format!(
            "Unsupported locator scheme: {}",
            url.scheme()
        ))),
        _ => Ok(PathBuf::from(locator)),
    }
}

/// Audio decoder wrapping symphonia.
pub struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<f64>,
    /// Decoded samples not yet handed out.
    pending: Vec<f32>,
    pending_pos: usize,
    finished: bool,
}

impl SymphoniaStream {
    /// Open a file and detect its container format.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let detected = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to detect format: {e}")))?;

        let format = detected.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(48000);
        let channels = track.codec_params.channels.map_or(2, |c| c.count());

        #[allow(clippy::cast_precision_loss)]
        let duration = track
            .codec_params
            .time_base
            .zip(track.codec_params.n_frames)
            .map(|(time_base, n_frames)| {
                let time = time_base.calc_time(n_frames);
                time.seconds as f64 + time.frac
            });

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}, duration={:?}",
            track_id, sample_rate, channels, duration
        );

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        })
    }

    /// Decode the next packet into `pending`. Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(symphonia::core::errors::Error::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.pending.clear();
                    self.pending_pos = 0;
                    append_interleaved(&decoded, &mut self.pending);
                    return Ok(true);
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // Log and skip corrupt frames
                    error!("Decode error (skipping): {e}");
                }
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Decode failed: {e}")));
                }
            }
        }
    }
}

impl DecodeStream for SymphoniaStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.duration
    }

    fn read(&mut self, frames: usize, out: &mut Vec<f32>) -> Result<usize> {
        let wanted = frames * self.channels;
        let mut copied = 0;

        while copied < wanted && !self.finished {
            if self.pending_pos >= self.pending.len() && !self.decode_next()? {
                self.finished = true;
                break;
            }
            let available = &self.pending[self.pending_pos..];
            let take = available.len().min(wanted - copied);
            out.extend_from_slice(&available[..take]);
            self.pending_pos += take;
            copied += take;
        }

        Ok(copied / self.channels)
    }
}

/// Append a decoded buffer to `out` as interleaved f32 samples.
fn append_interleaved(buffer: &AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match buffer {
        AudioBufferRef::U8(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::U16(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::U24(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::U32(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::S8(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::S16(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::S24(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::S32(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::F32(buf) => interleave_planes(&**buf, out),
        AudioBufferRef::F64(buf) => interleave_planes(&**buf, out),
    }
}

fn interleave_planes<S>(buffer: &AudioBuffer<S>, out: &mut Vec<f32>)
where
    S: Sample + IntoSample<f32>,
{
    let planes = buffer.planes();
    let channel_planes = planes.planes();
    let frames = buffer.frames();
    out.reserve(frames * channel_planes.len());

    for frame in 0..frames {
        for plane in channel_planes {
            out.push(plane[frame].into_sample());
        }
    }
}

/// In-memory interleaved clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: Arc<[f32]>,
}

impl Clip {
    pub fn new(sample_rate: u32, channels: usize, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples: samples.into(),
        }
    }

    /// A clip holding `frames` frames of one constant value on every channel.
    pub fn constant(sample_rate: u32, channels: usize, frames: usize, value: f32) -> Self {
        Self::new(sample_rate, channels, vec![value; frames * channels])
    }

    pub fn frames(&self) -> usize {
        self.samples.len().checked_div(self.channels).unwrap_or(0)
    }
}

/// Stream over a [`Clip`].
#[derive(Debug, Clone)]
pub struct MemoryStream {
    clip: Clip,
    position: usize,
}

impl MemoryStream {
    pub const fn new(clip: Clip) -> Self {
        Self { clip, position: 0 }
    }
}

impl DecodeStream for MemoryStream {
    fn sample_rate(&self) -> u32 {
        self.clip.sample_rate
    }

    fn channels(&self) -> usize {
        self.clip.channels
    }

    #[allow(clippy::cast_precision_loss)]
    fn duration_seconds(&self) -> Option<f64> {
        Some(self.clip.frames() as f64 / f64::from(self.clip.sample_rate))
    }

    fn read(&mut self, frames: usize, out: &mut Vec<f32>) -> Result<usize> {
        let take = frames.min(self.clip.frames() - self.position);
        let channels = self.clip.channels;
        let start = self.position * channels;
        out.extend_from_slice(&self.clip.samples[start..start + take * channels]);
        self.position += take;
        Ok(take)
    }
}

/// Adapter serving clips registered under string locators.
///
/// Useful for pads preloaded into memory and for driving the engine without
/// touching the filesystem.
#[derive(Default)]
pub struct MemoryAdapter {
    clips: RwLock<HashMap<String, Clip>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `clip` under `locator`, replacing any previous clip.
    pub fn insert(&self, locator: impl Into<String>, clip: Clip) {
        self.clips.write().insert(locator.into(), clip);
    }

    /// Forget `locator`. Returns true if it was registered.
    pub fn remove(&self, locator: &str) -> bool {
        self.clips.write().remove(locator).is_some()
    }
}

impl DecoderAdapter for MemoryAdapter {
    fn open(&self, locator: &str) -> Result<Box<dyn DecodeStream>> {
        let clip = self
            .clips
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::AudioDecode(format!("No clip registered for {locator}")))?;
        if clip.channels == 0 {
            return Err(Error::UnsupportedFormat(format!(
                "Clip {locator} has no channels"
            )));
        }
        Ok(Box::new(MemoryStream::new(clip)))
    }
}
