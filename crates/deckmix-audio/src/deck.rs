//! Decks: one playable track with transport, varispeed, and stereo image.
//!
//! A deck is split in two. [`Deck`] lives on the control thread: it loads
//! tracks (blocking I/O and allocation happen here) and writes parameters.
//! [`DeckVoice`] lives on the audio thread and renders blocks. They share a
//! [`DeckParams`] of atomics and pass whole tracks over bounded channels:
//! new tracks go to the voice, replaced tracks come back so they are freed
//! off the audio thread.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use deckmix_core::{DeckId, Error, Result};
use tracing::{debug, info, warn};

use crate::decode::DecoderAdapter;
use crate::params::DeckParams;
use crate::stereo;
use crate::track::Track;
use crate::varispeed::{FrameSource, Varispeed};

/// Replaced tracks the voice can hand back before the control side drains them.
const RETIRE_CAPACITY: usize = 4;

/// Upper bound of the resampling ratio.
pub const MAX_SPEED: f64 = 100.0;

/// Read-only, lock-free view of a deck for position displays.
#[derive(Debug, Clone)]
pub struct DeckMonitor {
    id: DeckId,
    params: Arc<DeckParams>,
    sample_rate: u32,
}

impl DeckMonitor {
    pub const fn id(&self) -> DeckId {
        self.id
    }

    /// Playhead in seconds; 0 when nothing is loaded.
    #[allow(clippy::cast_precision_loss)]
    pub fn current_position(&self) -> f64 {
        let length = self.params.length_frames() as f64;
        self.params.playhead.get().clamp(0.0, length) / f64::from(self.sample_rate)
    }

    /// Track length in seconds; 0 when nothing is loaded.
    #[allow(clippy::cast_precision_loss)]
    pub fn length(&self) -> f64 {
        self.params.length_frames() as f64 / f64::from(self.sample_rate)
    }

    /// Playhead as a fraction of the length; 0 when nothing is loaded.
    pub fn relative_position(&self) -> f64 {
        let length = self.length();
        if length > 0.0 {
            self.current_position() / length
        } else {
            0.0
        }
    }

    pub fn is_playing(&self) -> bool {
        self.params.is_playing()
    }
}

/// Control half of a deck.
pub struct Deck {
    monitor: DeckMonitor,
    track: Option<Arc<Track>>,
    install_tx: Sender<Arc<Track>>,
    /// Kept so a load can take back an install the voice has not seen yet.
    install_rx: Receiver<Arc<Track>>,
    retire_rx: Receiver<Arc<Track>>,
}

impl Deck {
    /// Create a deck and its render half for an engine running at `sample_rate`.
    pub fn new(id: DeckId, sample_rate: u32) -> (Self, DeckVoice) {
        let params = Arc::new(DeckParams::default());
        let (install_tx, install_rx) = bounded(1);
        let (retire_tx, retire_rx) = bounded(RETIRE_CAPACITY);

        let voice = DeckVoice {
            id,
            params: Arc::clone(&params),
            track: None,
            install_rx: install_rx.clone(),
            retire_tx,
            varispeed: Varispeed::new(),
            last_gain: 1.0,
            was_playing: false,
        };

        let deck = Self {
            monitor: DeckMonitor {
                id,
                params,
                sample_rate,
            },
            track: None,
            install_tx,
            install_rx,
            retire_rx,
        };

        (deck, voice)
    }

    pub const fn id(&self) -> DeckId {
        self.monitor.id
    }

    /// A cloneable read-only view for position consumers.
    pub fn monitor(&self) -> DeckMonitor {
        self.monitor.clone()
    }

    /// Locator of the loaded track.
    pub fn locator(&self) -> Option<&str> {
        self.track.as_deref().map(Track::locator)
    }

    /// Decode `locator` and replace the current track with it.
    ///
    /// All or nothing: on failure the current track, position, and transport
    /// are untouched. On success transport stops, the position returns to 0,
    /// and the new length (seconds) is returned.
    pub fn load(&mut self, adapter: &dyn DecoderAdapter, locator: &str) -> Result<f64> {
        self.collect_retired();

        let track = Track::load(adapter, locator, self.monitor.sample_rate).map_err(|e| {
            warn!("Deck {}: failed to load {}: {}", self.id(), locator, e);
            match e {
                Error::LoadFailed { .. } => e,
                other => Error::load_failed(locator, &other),
            }
        })?;

        Ok(self.install(track))
    }

    /// Replace the current track with an already decoded one.
    ///
    /// The track must be at this deck's sample rate.
    pub fn install(&mut self, track: Track) -> f64 {
        let track = Arc::new(track);
        let params = &self.monitor.params;

        params.set_playing(false);
        // An install the voice has not picked up yet is superseded
        while self.install_rx.try_recv().is_ok() {}
        params.bump_generation();
        params.playhead.set(0.0);
        params.set_length_frames(track.frames() as u64);
        if self.install_tx.try_send(Arc::clone(&track)).is_err() {
            warn!("Deck {}: render half is gone, track not installed", self.id());
        }

        info!(
            "Deck {}: loaded {} ({:.2}s)",
            self.id(),
            track.locator(),
            track.duration_seconds()
        );
        self.track = Some(track);
        self.length()
    }

    /// Set the output gain.
    pub fn set_gain(&self, gain: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(Error::InvalidArgument(format!(
                "gain should be between 0 and 1, got {gain}"
            )));
        }
        debug!("Deck {}: gain {:.3}", self.id(), gain);
        self.monitor.params.gain.set(gain);
        Ok(())
    }

    /// Set the resampling ratio. Speed and pitch change together.
    pub fn set_speed(&self, ratio: f64) -> Result<()> {
        if !(0.0..=MAX_SPEED).contains(&ratio) {
            return Err(Error::InvalidArgument(format!(
                "speed ratio should be between 0 and {MAX_SPEED}, got {ratio}"
            )));
        }
        debug!("Deck {}: speed {:.3}", self.id(), ratio);
        self.monitor.params.speed.set(ratio);
        Ok(())
    }

    /// Set the stereo width, clamped to `[0, 1]`. NaN is ignored.
    pub fn set_stereo_width(&self, width: f64) {
        if width.is_nan() {
            warn!("Deck {}: ignoring NaN stereo width", self.id());
            return;
        }
        self.monitor.params.width.set(width.clamp(0.0, 1.0));
    }

    /// Move the playhead to `seconds`, clamped to the track.
    pub fn seek(&self, seconds: f64) -> Result<()> {
        if seconds.is_nan() {
            return Err(Error::InvalidArgument("seek position is NaN".to_string()));
        }
        let seconds = seconds.clamp(0.0, self.length());
        self.monitor
            .params
            .playhead
            .set(seconds * f64::from(self.monitor.sample_rate));
        Ok(())
    }

    /// Move the playhead to `fraction` of the track length.
    pub fn seek_relative(&self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::InvalidArgument(format!(
                "relative position should be between 0 and 1, got {fraction}"
            )));
        }
        self.seek(fraction * self.length())
    }

    /// Start playback. Returns false if it was already playing.
    pub fn start(&self) -> bool {
        !self.monitor.params.set_playing(true)
    }

    /// Stop playback. Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        self.monitor.params.set_playing(false)
    }

    pub fn gain(&self) -> f64 {
        self.monitor.params.gain.get()
    }

    pub fn speed(&self) -> f64 {
        self.monitor.params.speed.get()
    }

    pub fn stereo_width(&self) -> f64 {
        self.monitor.params.width.get()
    }

    pub fn is_playing(&self) -> bool {
        self.monitor.is_playing()
    }

    pub fn current_position(&self) -> f64 {
        self.monitor.current_position()
    }

    pub fn relative_position(&self) -> f64 {
        self.monitor.relative_position()
    }

    pub fn length(&self) -> f64 {
        self.monitor.length()
    }

    /// Free tracks the voice has swapped out. Returns how many were freed.
    pub fn collect_retired(&self) -> usize {
        self.retire_rx.try_iter().count()
    }
}

/// Render half of a deck, owned by the audio thread.
pub struct DeckVoice {
    id: DeckId,
    params: Arc<DeckParams>,
    track: Option<Arc<Track>>,
    install_rx: Receiver<Arc<Track>>,
    retire_tx: Sender<Arc<Track>>,
    varispeed: Varispeed,
    last_gain: f32,
    was_playing: bool,
}

impl DeckVoice {
    pub const fn id(&self) -> DeckId {
        self.id
    }

    /// Render interleaved stereo into `out`, overwriting it.
    ///
    /// Real-time safe: no locks, no allocation, no I/O.
    pub fn render_block(&mut self, out: &mut [f32]) {
        self.take_installed();

        if !self.params.is_playing() {
            if self.was_playing {
                self.varispeed.reset();
                self.was_playing = false;
            }
            out.fill(0.0);
            return;
        }

        #[allow(clippy::cast_possible_truncation)]
        let gain = self.params.gain.get() as f32;
        // Starting from silence needs no ramp
        if !self.was_playing {
            self.last_gain = gain;
            self.was_playing = true;
        }

        let Some(track) = self.track.as_deref() else {
            out.fill(0.0);
            return;
        };
        let total = track.frames();

        let generation = self.params.generation();
        let start = self.params.playhead.get();
        #[allow(clippy::cast_possible_truncation)]
        let mut reader = TrackReader {
            track,
            cursor: start.max(0.0) as usize,
        };

        let produced = self
            .varispeed
            .process(self.params.speed.get(), &mut reader, out);
        let rendered = &mut out[..produced * 2];
        stereo::apply(self.params.width.get(), rendered);
        ramp_gain(&mut self.last_gain, gain, rendered);

        #[allow(clippy::cast_precision_loss)]
        let end = reader.cursor.min(total) as f64;
        let advanced = self.commit_playhead(start, end, generation);

        if advanced && produced < out.len() / 2 {
            self.params.set_playing(false);
            self.varispeed.reset();
            self.was_playing = false;
        }
    }

    /// Publish the cursor a block reached after starting at `start`.
    ///
    /// Returns false when a seek or a track install landed during the block;
    /// their position wins.
    fn commit_playhead(&self, start: f64, end: f64, generation: u64) -> bool {
        if !self.params.playhead.compare_exchange(start, end) {
            return false;
        }
        if self.params.generation() == generation {
            return true;
        }
        // An install reset the playhead to the same value this block began at
        self.params.playhead.compare_exchange(end, 0.0);
        false
    }

    #[cfg(test)]
    const fn is_primed(&self) -> bool {
        self.varispeed.is_primed()
    }

    /// Swap in a newly loaded track, returning the old one for freeing.
    fn take_installed(&mut self) {
        if let Ok(track) = self.install_rx.try_recv() {
            if let Some(old) = self.track.replace(track) {
                // A full retire queue drops it here instead
                let _ = self.retire_tx.try_send(old);
            }
            self.varispeed.reset();
        }
    }
}

/// Sequential reader over a track's frames.
struct TrackReader<'a> {
    track: &'a Track,
    cursor: usize,
}

impl FrameSource for TrackReader<'_> {
    #[inline]
    fn next_frame(&mut self) -> Option<[f32; 2]> {
        let frame = self.track.frame(self.cursor)?;
        self.cursor += 1;
        Some(frame)
    }
}

/// Scale `block` by a gain ramping linearly from `last` to `target`.
#[allow(clippy::float_cmp)]
fn ramp_gain(last: &mut f32, target: f32, block: &mut [f32]) {
    let frames = block.len() / 2;
    if frames == 0 {
        return;
    }

    if *last == target {
        if target != 1.0 {
            block.iter_mut().for_each(|s| *s *= target);
        }
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    let step = (target - *last) / frames as f32;
    let mut gain = *last;
    for frame in block.chunks_exact_mut(2) {
        gain += step;
        frame[0] *= gain;
        frame[1] *= gain;
    }
    *last = target;
}
