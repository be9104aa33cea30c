//! # deckmix-audio
//!
//! Two-deck mixing engine for deckmix.
//!
//! Features:
//! - Full decode on load via symphonia, converted to the engine rate with rubato
//! - Lock-free deck parameters and track handoff to the audio thread
//! - Varispeed playback, mid/side stereo width, and a crossfaded additive bus
//! - Low-latency cpal output

pub mod deck;
pub mod decode;
pub mod engine;
pub mod mixer;
pub mod output;
pub mod params;
pub mod resample;
pub mod stereo;
pub mod track;
pub mod varispeed;

pub use deck::{Deck, DeckMonitor, DeckVoice};
pub use decode::{Clip, DecodeStream, DecoderAdapter, MemoryAdapter, SymphoniaAdapter};
pub use engine::{Engine, EngineEvent, EngineHandle, Renderer};
pub use mixer::{BusRouting, DeckRack, MixerBus};
pub use output::{default_output_config, AudioOutput, OutputConfig};
pub use track::Track;
