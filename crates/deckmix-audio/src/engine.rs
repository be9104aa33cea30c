//! Engine coordinating the decks, the gain law, scratching, and the bus.
//!
//! [`Engine`] is the control side: every UI interaction arrives as a
//! [`Command`] through [`Engine::dispatch`]. [`Renderer`] is the audio side
//! and is moved into the output callback. [`Engine::spawn`] moves the control
//! side onto its own worker thread behind an [`EngineHandle`].

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use deckmix_core::{
    Command, DeckId, EngineConfig, Error, GainModel, GainSnapshot, Result, ScratchMapper,
};
use tracing::{debug, info, warn};

use crate::decode::DecoderAdapter;
use crate::deck::{Deck, DeckMonitor};
use crate::mixer::{BusRouting, DeckRack, MixerBus};

/// Events buffered for a slow consumer before new ones are dropped.
const EVENT_CAPACITY: usize = 1024;

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A track finished loading onto a deck.
    TrackLoaded {
        deck: DeckId,
        locator: String,
        length: f64,
    },
    /// A load failed; the deck kept its previous track.
    LoadFailed {
        deck: DeckId,
        locator: String,
        reason: String,
    },
    /// A deck started or stopped.
    TransportChanged { deck: DeckId, playing: bool },
    /// The gain law produced new music-deck gains.
    GainsChanged(GainSnapshot),
    /// A command was refused and changed nothing.
    CommandRejected { command: Command, reason: String },
}

/// Audio-thread half of the engine.
pub struct Renderer {
    rack: DeckRack,
    bus: MixerBus,
    sample_rate: u32,
}

impl Renderer {
    /// Fill interleaved stereo `out` with the next block of the mix.
    pub fn render(&mut self, out: &mut [f32]) {
        self.bus.render_block(&mut self.rack, out);
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Control-thread half of the engine.
pub struct Engine {
    config: EngineConfig,
    adapter: Arc<dyn DecoderAdapter>,
    decks: Vec<Deck>,
    scratch: Vec<ScratchMapper>,
    gains: GainModel,
    routing: BusRouting,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
}

impl Engine {
    /// Build the three decks and the bus, then apply the initial gain law.
    ///
    /// The music decks start at the gain the configured faders imply
    /// (0.25 each with the default 0.5 volume and center crossfade), not at
    /// unity gain waiting for the first fader move.
    pub fn new(config: EngineConfig, adapter: Arc<dyn DecoderAdapter>) -> Result<(Self, Renderer)> {
        config.validate()?;

        let mut decks = Vec::with_capacity(DeckId::COUNT);
        let mut voices = Vec::with_capacity(DeckId::COUNT);
        for id in DeckId::ALL {
            let (deck, voice) = Deck::new(id, config.sample_rate);
            decks.push(deck);
            voices.push(voice);
        }

        let routing = BusRouting::new();
        let renderer = Renderer {
            rack: DeckRack::new(voices),
            bus: MixerBus::new(
                DeckId::ALL.to_vec(),
                routing.clone(),
                config.max_block_frames,
            ),
            sample_rate: config.sample_rate,
        };

        let gains = GainModel::new(
            config.initial_volume,
            config.initial_volume,
            config.initial_crossfade,
        )?;
        let scratch = DeckId::ALL
            .iter()
            .map(|_| ScratchMapper::new(config.scratch_seconds_per_revolution))
            .collect();
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);

        let mut engine = Self {
            config,
            adapter,
            decks,
            scratch,
            gains,
            routing,
            event_tx,
            event_rx,
        };
        engine.apply_gains(gains.snapshot())?;

        info!(
            "Engine ready: {} Hz, {} pads",
            engine.config.sample_rate,
            engine.config.pads.len()
        );
        Ok((engine, renderer))
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }

    pub fn monitor(&self, id: DeckId) -> DeckMonitor {
        self.deck(id).monitor()
    }

    pub const fn gains(&self) -> &GainModel {
        &self.gains
    }

    pub fn routing(&self) -> BusRouting {
        self.routing.clone()
    }

    /// A receiver for engine events. All receivers share one queue.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    /// Apply one command.
    ///
    /// Rejected commands leave every deck untouched and are also reported
    /// as [`EngineEvent::CommandRejected`] or [`EngineEvent::LoadFailed`].
    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        debug!("Dispatching {:?}", command);
        let result = self.apply(&command);
        if let Err(e) = &result {
            if !e.is_load_failure() {
                warn!("Rejected {:?}: {}", command, e);
                self.emit(EngineEvent::CommandRejected {
                    command,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    fn apply(&mut self, command: &Command) -> Result<()> {
        match *command {
            Command::Load { deck, ref locator } => self.load(deck, locator).map(|_| ()),
            Command::SetGain { deck, value } => self.deck(deck).set_gain(value),
            Command::SetVolume { deck, value } => {
                let snapshot = match deck {
                    DeckId::Left => self.gains.set_left_volume(value)?,
                    DeckId::Right => self.gains.set_right_volume(value)?,
                    DeckId::Aux => {
                        return Err(Error::InvalidArgument(
                            "the aux deck has no volume fader".to_string(),
                        ))
                    }
                };
                self.apply_gains(snapshot)
            }
            Command::SetCrossfade { value } => {
                let snapshot = self.gains.set_crossfade(value)?;
                self.apply_gains(snapshot)
            }
            Command::SetSpeed { deck, value } => self.deck(deck).set_speed(value),
            Command::SetStereoWidth { deck, value } => {
                self.deck(deck).set_stereo_width(value);
                Ok(())
            }
            Command::Seek { deck, seconds } => self.deck(deck).seek(seconds),
            Command::SeekRelative { deck, fraction } => self.deck(deck).seek_relative(fraction),
            Command::Start { deck } => {
                self.start(deck);
                Ok(())
            }
            Command::Stop { deck } => {
                if self.deck(deck).stop() {
                    self.emit(EngineEvent::TransportChanged {
                        deck,
                        playing: false,
                    });
                }
                Ok(())
            }
            Command::BeginScratch { deck, angle } => {
                let position = self.deck(deck).current_position();
                self.scratch[deck.index()].begin(angle, position);
                Ok(())
            }
            Command::UpdateScratch { deck, angle } => {
                let length = self.deck(deck).length();
                match self.scratch[deck.index()].update(angle, length) {
                    Some(position) => self.deck(deck).seek(position),
                    None => Ok(()),
                }
            }
            Command::EndScratch { deck } => {
                self.scratch[deck.index()].end();
                Ok(())
            }
            Command::SetDeckEnabled { deck, enabled } => {
                debug!("Deck {}: bus {}", deck, if enabled { "on" } else { "off" });
                self.routing.set_enabled(deck, enabled);
                Ok(())
            }
            Command::TriggerPad { pad } => self.trigger_pad(pad),
        }
    }

    /// Load `locator` onto `deck`, returning the new length in seconds.
    pub fn load(&mut self, deck: DeckId, locator: &str) -> Result<f64> {
        let was_playing = self.deck(deck).is_playing();
        let adapter = Arc::clone(&self.adapter);

        match self.decks[deck.index()].load(adapter.as_ref(), locator) {
            Ok(length) => {
                self.scratch[deck.index()].end();
                self.emit(EngineEvent::TrackLoaded {
                    deck,
                    locator: locator.to_string(),
                    length,
                });
                if was_playing {
                    self.emit(EngineEvent::TransportChanged {
                        deck,
                        playing: false,
                    });
                }
                Ok(length)
            }
            Err(e) => {
                self.emit(EngineEvent::LoadFailed {
                    deck,
                    locator: locator.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Fire pad `pad`: load its sample on the aux deck at full gain and start it.
    pub fn trigger_pad(&mut self, pad: usize) -> Result<()> {
        let locator = self.config.pads.locator(pad)?.to_string();
        self.load(DeckId::Aux, &locator)?;
        self.deck(DeckId::Aux).set_gain(1.0)?;
        self.start(DeckId::Aux);
        Ok(())
    }

    fn start(&self, deck: DeckId) {
        if self.deck(deck).start() {
            self.emit(EngineEvent::TransportChanged {
                deck,
                playing: true,
            });
        }
    }

    fn apply_gains(&self, snapshot: GainSnapshot) -> Result<()> {
        self.deck(DeckId::Left).set_gain(snapshot.left)?;
        self.deck(DeckId::Right).set_gain(snapshot.right)?;
        self.emit(EngineEvent::GainsChanged(snapshot));
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            debug!("Event queue full, dropping event");
        }
    }

    /// Run the control side on a worker thread fed by a command channel.
    pub fn spawn(self) -> Result<EngineHandle> {
        let (command_tx, command_rx) = unbounded();
        let event_rx = self.events();
        let monitors = DeckId::ALL.iter().map(|id| self.monitor(*id)).collect();

        let worker = std::thread::Builder::new()
            .name("deck-control".to_string())
            .spawn(move || self.run(&command_rx))
            .map_err(|e| Error::Internal(format!("Failed to spawn control thread: {e}")))?;

        Ok(EngineHandle {
            command_tx,
            event_rx,
            monitors,
            worker: Some(worker),
        })
    }

    fn run(mut self, command_rx: &Receiver<ControlMessage>) {
        info!("Control worker started");
        for message in command_rx {
            match message {
                ControlMessage::Command(command) => {
                    if let Err(e) = self.dispatch(command) {
                        debug!("Command failed: {e}");
                    }
                }
                ControlMessage::Shutdown => break,
            }
        }
        info!("Control worker stopped");
    }
}

enum ControlMessage {
    Command(Command),
    Shutdown,
}

/// Handle to an engine running on its worker thread.
pub struct EngineHandle {
    command_tx: Sender<ControlMessage>,
    event_rx: Receiver<EngineEvent>,
    monitors: Vec<DeckMonitor>,
    worker: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Queue a command for the worker.
    pub fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(ControlMessage::Command(command))
            .map_err(|_| Error::EngineStopped)
    }

    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    pub fn monitor(&self, deck: DeckId) -> DeckMonitor {
        self.monitors[deck.index()].clone()
    }

    /// Stop the worker after it drains the commands already queued.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.command_tx.send(ControlMessage::Shutdown);
        worker
            .join()
            .map_err(|_| Error::Internal("control worker panicked".to_string()))
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Engine shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]

    use super::*;
    use crate::decode::{Clip, MemoryAdapter};
    use deckmix_core::PadBank;
    use std::time::Duration;

    const RATE: u32 = 48000;

    fn adapter() -> Arc<MemoryAdapter> {
        let adapter = MemoryAdapter::new();
        adapter.insert("one", Clip::constant(RATE, 2, RATE as usize, 0.5));
        adapter.insert("two", Clip::constant(RATE, 2, 2 * RATE as usize, 0.5));
        adapter.insert("horn", Clip::constant(RATE, 1, RATE as usize / 2, 0.4));
        Arc::new(adapter)
    }

    fn engine() -> (Engine, Renderer) {
        let config = EngineConfig {
            pads: PadBank::new(vec!["horn".to_string(), "nowhere".to_string()]),
            ..EngineConfig::default()
        };
        Engine::new(config, adapter()).unwrap()
    }

    fn drain(engine: &Engine) -> Vec<EngineEvent> {
        engine.events().try_iter().collect()
    }

    #[test]
    fn test_initial_gain_law() {
        let (engine, _renderer) = engine();
        assert_eq!(engine.deck(DeckId::Left).gain(), 0.25);
        assert_eq!(engine.deck(DeckId::Right).gain(), 0.25);
        assert_eq!(engine.deck(DeckId::Aux).gain(), 1.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            sample_rate: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(config, adapter()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_crossfade_drives_music_decks() {
        let (mut engine, _renderer) = engine();
        engine.dispatch(Command::SetCrossfade { value: 0.0 }).unwrap();
        assert_eq!(engine.deck(DeckId::Left).gain(), 0.5);
        assert_eq!(engine.deck(DeckId::Right).gain(), 0.0);

        engine
            .dispatch(Command::SetVolume {
                deck: DeckId::Left,
                value: 1.0,
            })
            .unwrap();
        assert_eq!(engine.deck(DeckId::Left).gain(), 1.0);
        assert_eq!(engine.gains().left_volume(), 1.0);
    }

    #[test]
    fn test_rejected_command_reports_and_preserves() {
        let (mut engine, _renderer) = engine();
        drain(&engine);

        let command = Command::SetCrossfade { value: 1.5 };
        assert!(engine.dispatch(command.clone()).unwrap_err().is_invalid_argument());
        assert_eq!(engine.gains().crossfade(), 0.5);
        assert_eq!(engine.deck(DeckId::Left).gain(), 0.25);

        let events = drain(&engine);
        assert!(matches!(
            events.as_slice(),
            [EngineEvent::CommandRejected { command: c, .. }] if *c == command
        ));

        assert!(engine
            .dispatch(Command::SetVolume {
                deck: DeckId::Aux,
                value: 0.5
            })
            .is_err());
    }

    #[test]
    fn test_load_and_play_through_renderer() {
        let (mut engine, mut renderer) = engine();
        engine.dispatch(Command::SetCrossfade { value: 0.0 }).unwrap();
        engine
            .dispatch(Command::Load {
                deck: DeckId::Left,
                locator: "one".to_string(),
            })
            .unwrap();
        engine.dispatch(Command::Start { deck: DeckId::Left }).unwrap();

        let mut out = vec![0.0f32; 1024];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
        assert!(engine.monitor(DeckId::Left).current_position() > 0.0);

        let events = drain(&engine);
        assert!(events.contains(&EngineEvent::TransportChanged {
            deck: DeckId::Left,
            playing: true
        }));
        let loaded = events.iter().find_map(|e| match e {
            EngineEvent::TrackLoaded {
                deck: DeckId::Left,
                length,
                ..
            } => Some(*length),
            _ => None,
        });
        assert!((loaded.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_load_emits_event() {
        let (mut engine, _renderer) = engine();
        drain(&engine);
        let result = engine.dispatch(Command::Load {
            deck: DeckId::Right,
            locator: "missing".to_string(),
        });
        assert!(matches!(result, Err(Error::LoadFailed { .. })));
        assert!(matches!(
            drain(&engine).as_slice(),
            [EngineEvent::LoadFailed { deck: DeckId::Right, .. }]
        ));
    }

    #[test]
    fn test_scratch_seeks_deck() {
        let (mut engine, _renderer) = engine();
        engine.load(DeckId::Right, "two").unwrap();
        engine
            .dispatch(Command::Seek {
                deck: DeckId::Right,
                seconds: 1.0,
            })
            .unwrap();

        engine
            .dispatch(Command::BeginScratch {
                deck: DeckId::Right,
                angle: 0.0,
            })
            .unwrap();
        engine
            .dispatch(Command::UpdateScratch {
                deck: DeckId::Right,
                angle: 0.5,
            })
            .unwrap();
        let expected = 1.0 + 0.5 * 5.0 / std::f64::consts::TAU;
        assert!((engine.deck(DeckId::Right).current_position() - expected).abs() < 1e-6);

        engine
            .dispatch(Command::EndScratch {
                deck: DeckId::Right,
            })
            .unwrap();
        engine
            .dispatch(Command::UpdateScratch {
                deck: DeckId::Right,
                angle: 2.0,
            })
            .unwrap();
        assert!((engine.deck(DeckId::Right).current_position() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_scratch_clamps_to_track() {
        let (mut engine, _renderer) = engine();
        engine.load(DeckId::Left, "one").unwrap();
        engine
            .dispatch(Command::BeginScratch {
                deck: DeckId::Left,
                angle: 0.0,
            })
            .unwrap();
        engine
            .dispatch(Command::UpdateScratch {
                deck: DeckId::Left,
                angle: -1.0,
            })
            .unwrap();
        assert_eq!(engine.deck(DeckId::Left).current_position(), 0.0);
    }

    #[test]
    fn test_trigger_pad_plays_on_aux() {
        let (mut engine, mut renderer) = engine();
        engine.dispatch(Command::TriggerPad { pad: 0 }).unwrap();
        let aux = engine.deck(DeckId::Aux);
        assert!(aux.is_playing());
        assert_eq!(aux.gain(), 1.0);
        assert_eq!(aux.locator(), Some("horn"));

        let mut out = vec![0.0f32; 64];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| (*s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_trigger_pad_errors() {
        let (mut engine, _renderer) = engine();
        assert!(matches!(
            engine.dispatch(Command::TriggerPad { pad: 9 }),
            Err(Error::UnknownPad(9))
        ));
        assert!(matches!(
            engine.dispatch(Command::TriggerPad { pad: 1 }),
            Err(Error::LoadFailed { .. })
        ));
        assert!(!engine.deck(DeckId::Aux).is_playing());
    }

    #[test]
    fn test_disable_deck_silences_bus() {
        let (mut engine, mut renderer) = engine();
        engine.dispatch(Command::TriggerPad { pad: 0 }).unwrap();
        engine
            .dispatch(Command::SetDeckEnabled {
                deck: DeckId::Aux,
                enabled: false,
            })
            .unwrap();

        let mut out = vec![1.0f32; 64];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(engine.monitor(DeckId::Aux).current_position(), 0.0);
    }

    #[test]
    fn test_worker_handle() {
        let (engine, _renderer) = engine();
        let mut handle = engine.spawn().unwrap();
        let events = handle.events();

        handle
            .send(Command::Load {
                deck: DeckId::Left,
                locator: "one".to_string(),
            })
            .unwrap();
        handle.send(Command::Start { deck: DeckId::Left }).unwrap();

        let mut loaded = false;
        while let Ok(event) = events.recv_timeout(Duration::from_secs(5)) {
            if matches!(event, EngineEvent::TrackLoaded { .. }) {
                loaded = true;
            }
            if matches!(event, EngineEvent::TransportChanged { playing: true, .. }) {
                break;
            }
        }
        assert!(loaded);
        assert!(handle.monitor(DeckId::Left).is_playing());
        assert!((handle.monitor(DeckId::Left).length() - 1.0).abs() < 1e-9);

        handle.shutdown().unwrap();
        assert!(matches!(
            handle.send(Command::Stop { deck: DeckId::Left }),
            Err(Error::EngineStopped)
        ));
    }
}
