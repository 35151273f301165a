//! Phase-locked stem playback.
//!
//! Every stem loops forever from one shared start frame `T0`, and gain
//! changes are linear ramps aligned to the bar grid measured from `T0`.
//! The control side ([`AudioTransport`]) and the render side talk through a
//! command channel and an event channel; per-stem gain and state are
//! published back through atomics.

mod clock;
mod command;
mod ramp;
mod render;
mod stem;

pub use clock::{TransportClock, next_quantized_time};
pub use ramp::{GainRamp, GainState};
pub use stem::PlayState;

use crate::audio_data::{AudioClip, AudioLibrary, AudioSourceResolver};
use crate::config::{OutputMode, TransportDesc};
use crate::engine::AudioEngine;
use crate::error::{Result, SoundWalkError};
use crate::events::TransportEvent;
use crate::mixer::StemOutput;
use crate::zone::stem_id_for_file;
use command::TransportCommand;
use crossbeam_channel::{Receiver, Sender};
use render::TransportRenderer;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use stem::{StemProbe, StemVoice};

/// Capacity of the render-to-control event channel.
const EVENT_CAPACITY: usize = 1024;

struct StemHandle {
    probe: Arc<StemProbe>,
    /// Last gain requested from the control side.
    target: f32,
    /// Frozen by `hold_gain`; the renderer's gain is the target.
    held: bool,
}

impl StemHandle {
    fn effective_target(&self) -> f32 {
        if self.held { self.probe.gain() } else { self.target }
    }
}

/// Loops a fixed set of stems in sample-accurate sync and ramps their gains.
///
/// # Example
///
/// ```no_run
/// use soundwalk::config::{OutputMode, TransportDesc};
/// use soundwalk::transport::AudioTransport;
/// use soundwalk::audio_data::AudioClip;
///
/// let desc = TransportDesc::default().tempo(98.0, 4).output(OutputMode::Offline);
/// let mut transport = AudioTransport::new(desc)?;
/// let clip = AudioClip::from_interleaved(vec![0.0; 48_000 * 2], 48_000, 2)?;
/// transport.add_stem("drums", clip, 0.0)?;
/// transport.start_all()?;
/// transport.set_gain("drums", 1.0, 1.2, 1)?;
/// # Ok::<(), soundwalk::SoundWalkError>(())
/// ```
pub struct AudioTransport {
    desc: TransportDesc,
    clock: TransportClock,
    frames: Arc<AtomicU64>,
    stems: BTreeMap<String, StemHandle>,
    commands: Sender<TransportCommand>,
    events: Receiver<TransportEvent>,
    renderer: Arc<Mutex<TransportRenderer>>,
    dropped_events: Arc<AtomicU64>,
    engine: Option<AudioEngine>,
    started: bool,
}

impl AudioTransport {
    /// # Errors
    ///
    /// `Configuration` if the descriptor is invalid. No device is opened
    /// until [`start_all`](Self::start_all).
    pub fn new(desc: TransportDesc) -> Result<Self> {
        desc.validate()?;

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        let frames = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));
        let renderer = Arc::new(Mutex::new(TransportRenderer::new(
            command_rx,
            event_tx,
            frames.clone(),
            dropped_events.clone(),
            desc.channels,
        )));

        let engine = match desc.output {
            OutputMode::Device => {
                let mut engine = AudioEngine::new(desc.clone());
                let renderer = renderer.clone();
                // The control side only locks the renderer once the stream
                // is stopped, so this never misses a block while playing
                engine.set_fill_callback(move |buffer, _sample_rate, _channels| {
                    match renderer.try_lock() {
                        Ok(mut renderer) => renderer.process_block(buffer),
                        Err(_) => {
                            buffer.fill(0.0);
                            0
                        }
                    }
                });
                Some(engine)
            }
            OutputMode::Offline => None,
        };

        Ok(Self {
            clock: TransportClock::from_desc(&desc),
            desc,
            frames,
            stems: BTreeMap::new(),
            commands: command_tx,
            events: event_rx,
            renderer,
            dropped_events,
            engine,
            started: false,
        })
    }

    pub fn desc(&self) -> &TransportDesc {
        &self.desc
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    /// Current position of the sample clock.
    pub fn now_frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn stem_ids(&self) -> impl Iterator<Item = &str> {
        self.stems.keys().map(String::as_str)
    }

    pub fn has_stem(&self, stem_id: &str) -> bool {
        self.stems.contains_key(stem_id)
    }

    /// Gain the renderer last applied to `stem_id`.
    pub fn stem_gain(&self, stem_id: &str) -> Option<f32> {
        self.stems.get(stem_id).map(|s| s.probe.gain())
    }

    pub fn stem_state(&self, stem_id: &str) -> Option<PlayState> {
        self.stems.get(stem_id).map(|s| s.probe.state())
    }

    /// Register a stem. Only allowed before [`start_all`](Self::start_all).
    ///
    /// Clips at another sample rate are resampled to the transport's rate.
    ///
    /// # Errors
    ///
    /// `Transport` after start or for a duplicate id, `AudioFormat` for an
    /// empty clip.
    pub fn add_stem(&mut self, stem_id: impl Into<String>, clip: AudioClip, initial_gain: f32) -> Result<()> {
        let stem_id = stem_id.into();
        if self.started {
            return Err(SoundWalkError::Transport(format!(
                "cannot add stem '{}' after start",
                stem_id
            )));
        }
        if self.stems.contains_key(&stem_id) {
            return Err(SoundWalkError::Transport(format!(
                "stem '{}' is already registered",
                stem_id
            )));
        }
        if clip.is_empty() {
            return Err(SoundWalkError::AudioFormat(format!(
                "stem '{}' has no audio",
                stem_id
            )));
        }

        let clip = if clip.sample_rate() != self.desc.sample_rate {
            log::debug!(
                "Resampling stem '{}' from {} Hz to {} Hz",
                stem_id,
                clip.sample_rate(),
                self.desc.sample_rate
            );
            clip.resample(self.desc.sample_rate)?
        } else {
            clip
        };
        // Very short clips can resample to nothing
        if clip.is_empty() {
            return Err(SoundWalkError::AudioFormat(format!(
                "stem '{}' has no audio at {} Hz",
                stem_id, self.desc.sample_rate
            )));
        }

        let gain = initial_gain.clamp(0.0, 1.0);
        let probe = Arc::new(StemProbe::new(gain));
        let voice = StemVoice::new(stem_id.clone(), clip, gain, probe.clone());
        self.send(TransportCommand::AddStem(Box::new(voice)))?;

        log::debug!("Registered stem '{}' at gain {:.2}", stem_id, gain);
        self.stems.insert(
            stem_id,
            StemHandle {
                probe,
                target: gain,
                held: false,
            },
        );
        Ok(())
    }

    /// Resolve `filename` and register it under `stem_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the resolver has no such file; the stem is not
    /// registered and the transport is otherwise unaffected.
    pub fn add_stem_file(
        &mut self,
        stem_id: impl Into<String>,
        filename: &str,
        resolver: &dyn AudioSourceResolver,
        initial_gain: f32,
    ) -> Result<()> {
        let clip = resolver.resolve(filename)?;
        self.add_stem(stem_id, clip, initial_gain)
    }

    /// Register every file in `library` as a silent stem named after its base
    /// name. Failures are logged and skipped. Returns the registered ids.
    pub fn register_library(&mut self, library: &AudioLibrary) -> Vec<String> {
        let mut registered = Vec::new();
        for filename in library.library_files() {
            let stem_id = stem_id_for_file(&filename);
            if self.has_stem(&stem_id) {
                log::warn!("Skipping {}: stem '{}' already registered", filename, stem_id);
                continue;
            }
            match self.add_stem_file(stem_id.clone(), &filename, library, 0.0) {
                Ok(()) => registered.push(stem_id),
                Err(e) => log::warn!("Skipping stem {}: {}", filename, e),
            }
        }
        log::info!("Registered {} stems from the audio library", registered.len());
        registered
    }

    /// Start every stem at one shared instant `T0 = now + preroll`.
    ///
    /// A no-op without stems or when already started. If the device cannot
    /// be opened the error is returned and the next call tries again.
    pub fn start_all(&mut self) -> Result<()> {
        if self.stems.is_empty() {
            log::debug!("start_all: no stems registered");
            return Ok(());
        }
        if self.started {
            return Ok(());
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.start()?;
        }

        let t0 = self.now_frame() + self.clock.seconds_to_frames(self.desc.preroll_seconds);
        self.clock.start_at(t0);
        for handle in self.stems.values() {
            handle.probe.set_state(PlayState::Scheduled);
        }
        self.send(TransportCommand::StartAt { t0_frame: t0 })?;
        self.started = true;

        log::info!("Transport started: {} stems, T0 at frame {}", self.stems.len(), t0);
        Ok(())
    }

    /// Ramp `stem_id` to `target` over `fade_seconds`, starting on the next
    /// `quantize_bars` grid point after now. Replaces any earlier ramp.
    ///
    /// Before start there is no grid, so the gain is applied immediately.
    pub fn set_gain(&mut self, stem_id: &str, target: f32, fade_seconds: f64, quantize_bars: u32) -> Result<()> {
        if !self.stems.contains_key(stem_id) {
            return Err(SoundWalkError::NotFound(format!("stem '{}'", stem_id)));
        }
        let target = target.clamp(0.0, 1.0);

        let command = if self.started {
            let now = self.now_frame();
            let start_frame = self.clock.next_quantized_frame(now, quantize_bars);
            log::debug!(
                "Stem '{}' -> {:.2} at frame {} (now {})",
                stem_id,
                target,
                start_frame,
                now
            );
            TransportCommand::SetGain {
                stem_id: stem_id.to_string(),
                target,
                start_frame,
                duration_frames: self.clock.seconds_to_frames(fade_seconds),
            }
        } else {
            TransportCommand::SetGainImmediate {
                stem_id: stem_id.to_string(),
                gain: target,
            }
        };
        self.send(command)?;

        if let Some(handle) = self.stems.get_mut(stem_id) {
            handle.target = target;
            handle.held = false;
            if !self.started {
                handle.probe.set_gain(target);
            }
        }
        Ok(())
    }

    /// Cancel any ramp on `stem_id` and keep its current gain.
    pub fn hold_gain(&mut self, stem_id: &str) -> Result<()> {
        let Some(handle) = self.stems.get_mut(stem_id) else {
            return Err(SoundWalkError::NotFound(format!("stem '{}'", stem_id)));
        };
        handle.target = handle.probe.gain();
        handle.held = true;
        self.send(TransportCommand::HoldGain {
            stem_id: stem_id.to_string(),
        })
    }

    /// Render one interleaved block without a device.
    ///
    /// # Errors
    ///
    /// `Transport` when a device drives this transport.
    pub fn render_block(&mut self, out: &mut [f32]) -> Result<usize> {
        if self.engine.is_some() {
            return Err(SoundWalkError::Transport(
                "render_block is only available in offline mode".into(),
            ));
        }
        let mut renderer = self
            .renderer
            .lock()
            .map_err(|_| SoundWalkError::Transport("renderer lock poisoned".into()))?;
        Ok(renderer.process_block(out))
    }

    /// Render `frames` frames offline in `block_size` chunks and return them.
    pub fn render_frames(&mut self, frames: usize) -> Result<Vec<f32>> {
        let channels = self.desc.channels as usize;
        let mut out = vec![0.0; frames * channels];
        for chunk in out.chunks_mut(self.desc.block_size * channels) {
            self.render_block(chunk)?;
        }
        Ok(out)
    }

    /// Drain the events reported by the renderer since the last call.
    pub fn poll_events(&self) -> Vec<TransportEvent> {
        self.events.try_iter().collect()
    }

    /// Events the renderer could not report because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Stop the device and return every stem to `Stopped`.
    ///
    /// Stems stay registered; a later [`start_all`](Self::start_all)
    /// schedules them against a fresh `T0`.
    pub fn teardown(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        // With the stream gone the renderer is free to lock
        if self.send(TransportCommand::StopAll).is_ok() {
            if let Ok(mut renderer) = self.renderer.lock() {
                renderer.drain_commands();
            }
        }
        self.clock.reset();
        self.started = false;
        log::info!("Transport torn down");
    }

    fn send(&self, command: TransportCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SoundWalkError::Transport("renderer is gone".into()))
    }
}

impl StemOutput for AudioTransport {
    fn stem_targets(&self) -> BTreeMap<String, f32> {
        self.stems
            .iter()
            .map(|(id, handle)| (id.clone(), handle.effective_target()))
            .collect()
    }

    fn set_gain(&mut self, stem_id: &str, target: f32, fade_seconds: f64, quantize_bars: u32) -> Result<()> {
        AudioTransport::set_gain(self, stem_id, target, fade_seconds, quantize_bars)
    }

    fn hold_gain(&mut self, stem_id: &str) -> Result<()> {
        AudioTransport::hold_gain(self, stem_id)
    }

    fn start_all(&mut self) -> Result<()> {
        AudioTransport::start_all(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RATE: u32 = 1000;

    fn offline(bpm: f64, preroll: f64) -> AudioTransport {
        let desc = TransportDesc::default()
            .sample_rate(RATE)
            .channels(1)
            .block_size(100)
            .tempo(bpm, 4)
            .preroll_seconds(preroll)
            .output(OutputMode::Offline);
        AudioTransport::new(desc).unwrap()
    }

    fn constant_clip(seconds: f64, level: f32) -> AudioClip {
        let frames = (seconds * RATE as f64) as usize;
        AudioClip::from_interleaved(vec![level; frames], RATE, 1).unwrap()
    }

    #[test]
    fn test_loop_boundaries_follow_t0() {
        let mut t = offline(120.0, 0.5);
        t.add_stem("bed", constant_clip(10.0, 0.5), 1.0).unwrap();
        t.start_all().unwrap();
        assert_eq!(t.clock().t0(), Some(500));
        assert_eq!(t.stem_state("bed"), Some(PlayState::Scheduled));

        let out = t.render_frames(25_000).unwrap();
        assert!(out[..500].iter().all(|s| *s == 0.0));
        // Zero gap across both boundaries
        assert!(out[500..].iter().all(|s| *s == 0.5));

        let events = t.poll_events();
        assert_eq!(
            events,
            vec![
                TransportEvent::StemStarted {
                    stem_id: "bed".into(),
                    frame: 500
                },
                TransportEvent::StemLooped {
                    stem_id: "bed".into(),
                    loop_count: 1,
                    frame: 10_500
                },
                TransportEvent::StemLooped {
                    stem_id: "bed".into(),
                    loop_count: 2,
                    frame: 20_500
                },
            ]
        );
        assert_eq!(t.stem_state("bed"), Some(PlayState::Looping));
    }

    #[test]
    fn test_ramp_starts_on_next_bar() {
        let mut t = offline(98.0, 0.0);
        t.add_stem("drums", constant_clip(4.0, 1.0), 1.0).unwrap();
        t.start_all().unwrap();
        t.render_frames(5000).unwrap();
        t.poll_events();

        t.set_gain("drums", 0.0, 1.0, 1).unwrap();
        let out = t.render_frames(4000).unwrap();

        // Unchanged up to the bar line at 7.347 s
        assert_eq!(out[7346 - 5000], 1.0);
        assert_eq!(out[8347 - 5000], 0.0);
        assert_eq!(t.stem_gain("drums"), Some(0.0));

        let ramp_events: Vec<_> = t.poll_events().into_iter().filter(|e| e.is_ramp_event()).collect();
        assert_eq!(
            ramp_events,
            vec![
                TransportEvent::RampStarted {
                    stem_id: "drums".into(),
                    from: 1.0,
                    to: 0.0,
                    frame: 7347
                },
                TransportEvent::RampCompleted {
                    stem_id: "drums".into(),
                    gain: 0.0,
                    frame: 8347
                },
            ]
        );
    }

    #[test]
    fn test_latest_ramp_wins() {
        let mut t = offline(120.0, 0.0);
        t.add_stem("pads", constant_clip(4.0, 1.0), 1.0).unwrap();
        t.start_all().unwrap();
        t.render_frames(100).unwrap();

        t.set_gain("pads", 0.0, 0.5, 1).unwrap();
        t.set_gain("pads", 0.6, 0.5, 1).unwrap();
        t.render_frames(3000).unwrap();

        let events: Vec<_> = t.poll_events().into_iter().filter(|e| e.is_ramp_event()).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TransportEvent::RampSuperseded { .. }));
        assert!(matches!(events[1], TransportEvent::RampStarted { to, frame: 2000, .. } if to == 0.6));
        assert!(matches!(events[2], TransportEvent::RampCompleted { .. }));
        assert_relative_eq!(t.stem_gain("pads").unwrap(), 0.6);
        assert_eq!(t.stem_targets().get("pads"), Some(&0.6));
    }

    #[test]
    fn test_gain_before_start_is_immediate() {
        let mut t = offline(120.0, 0.0);
        t.add_stem("vox", constant_clip(1.0, 1.0), 0.0).unwrap();
        t.set_gain("vox", 0.8, 1.2, 1).unwrap();
        assert_relative_eq!(t.stem_gain("vox").unwrap(), 0.8);

        t.start_all().unwrap();
        let out = t.render_frames(10).unwrap();
        assert_relative_eq!(out[0], 0.8);
    }

    #[test]
    fn test_unknown_stems_are_not_found() {
        struct Empty;
        impl AudioSourceResolver for Empty {
            fn resolve(&self, filename: &str) -> Result<AudioClip> {
                Err(SoundWalkError::NotFound(filename.to_string()))
            }
        }

        let mut t = offline(120.0, 0.0);
        let err = t.add_stem_file("ghost", "ghost.wav", &Empty, 1.0).unwrap_err();
        assert!(err.is_not_found());
        assert!(!t.has_stem("ghost"));
        assert!(t.set_gain("ghost", 1.0, 1.0, 1).unwrap_err().is_not_found());
        assert!(t.hold_gain("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_start_without_stems_is_noop() {
        let mut t = offline(120.0, 0.0);
        t.start_all().unwrap();
        assert!(!t.is_started());
        assert_eq!(t.clock().t0(), None);
    }

    #[test]
    fn test_stems_are_fixed_after_start() {
        let mut t = offline(120.0, 0.0);
        t.add_stem("a", constant_clip(1.0, 1.0), 1.0).unwrap();
        assert!(t.add_stem("a", constant_clip(1.0, 1.0), 1.0).is_err());
        assert!(t.add_stem("empty", constant_clip(0.0, 1.0), 1.0).is_err());

        t.start_all().unwrap();
        t.start_all().unwrap();
        assert!(t.add_stem("b", constant_clip(1.0, 1.0), 1.0).is_err());
    }

    #[test]
    fn test_hold_freezes_mid_ramp() {
        let mut t = offline(120.0, 0.0);
        t.add_stem("bass", constant_clip(4.0, 1.0), 1.0).unwrap();
        t.start_all().unwrap();
        t.render_frames(100).unwrap();

        // Ramp 1.0 -> 0.0 from frame 2000 over 1 s; hold halfway
        t.set_gain("bass", 0.0, 1.0, 1).unwrap();
        t.render_frames(2400).unwrap();
        t.hold_gain("bass").unwrap();
        t.render_frames(2000).unwrap();

        let gain = t.stem_gain("bass").unwrap();
        assert!(gain > 0.4 && gain < 0.7, "gain {}", gain);
        assert_relative_eq!(t.stem_targets()["bass"], gain, epsilon = 0.01);
    }

    #[test]
    fn test_hold_reports_the_frozen_gain() {
        let mut t = offline(120.0, 0.0);
        t.add_stem("bass", constant_clip(4.0, 1.0), 1.0).unwrap();
        t.start_all().unwrap();
        t.set_gain("bass", 0.0, 1.0, 1).unwrap();
        t.render_frames(2400).unwrap();

        // The renderer can move on between reading the gain and applying the hold
        t.stems["bass"].probe.set_gain(0.9);
        t.hold_gain("bass").unwrap();
        t.render_frames(100).unwrap();

        let frozen = t.stem_gain("bass").unwrap();
        assert!(frozen < 0.9);
        assert_eq!(t.stem_targets()["bass"], frozen);

        // Asking for the stale value is a real change again
        t.set_gain("bass", 0.9, 0.0, 0).unwrap();
        t.render_frames(100).unwrap();
        assert_relative_eq!(t.stem_gain("bass").unwrap(), 0.9);
        assert_eq!(t.stem_targets()["bass"], 0.9);
    }

    #[test]
    fn test_dropped_events_never_wait_for_the_renderer() {
        let t = offline(120.0, 0.0);
        let _busy = t.renderer.lock().unwrap();
        assert_eq!(t.dropped_events(), 0);
    }

    #[test]
    fn test_clip_too_short_for_the_transport_rate_is_rejected() {
        let mut t = offline(120.0, 0.0);
        let click = AudioClip::from_interleaved(vec![0.5; 10], 48_000, 1).unwrap();
        let err = t.add_stem("click", click, 1.0).unwrap_err();
        assert!(matches!(err, SoundWalkError::AudioFormat(_)));
        assert!(!t.has_stem("click"));

        t.add_stem("bed", constant_clip(1.0, 0.5), 1.0).unwrap();
        t.start_all().unwrap();
        let out = t.render_frames(200).unwrap();
        assert!(out.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_undecodable_library_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        crate::audio_data::fixtures::write_test_tone(&dir.path().join("birds.wav"), RATE);
        std::fs::write(dir.path().join("broken.wav"), b"definitely not a riff header").unwrap();

        let library = AudioLibrary::new(Some(dir.path().to_path_buf()), None);
        let mut t = offline(120.0, 0.0);
        let registered = t.register_library(&library);

        assert_eq!(registered, vec!["birds".to_string()]);
        assert!(t.has_stem("birds"));
        assert!(!t.has_stem("broken"));
        t.start_all().unwrap();
        assert!(t.is_started());
    }

    #[test]
    fn test_teardown_stops_everything() {
        let mut t = offline(120.0, 0.0);
        t.add_stem("a", constant_clip(1.0, 1.0), 1.0).unwrap();
        t.add_stem("b", constant_clip(1.0, 1.0), 1.0).unwrap();
        t.start_all().unwrap();
        t.render_frames(200).unwrap();

        t.teardown();
        assert_eq!(t.stem_state("a"), Some(PlayState::Stopped));
        assert_eq!(t.stem_state("b"), Some(PlayState::Stopped));
        assert!(t.poll_events().contains(&TransportEvent::AllStopped));

        let out = t.render_frames(100).unwrap();
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_foreign_sample_rate_is_resampled() {
        let mut t = offline(120.0, 0.0);
        let clip = AudioClip::from_interleaved(vec![0.3; 2000], 2000, 1).unwrap();
        t.add_stem("field", clip, 1.0).unwrap();
        t.start_all().unwrap();

        t.render_frames(1000).unwrap();
        let looped = t
            .poll_events()
            .into_iter()
            .any(|e| matches!(e, TransportEvent::StemLooped { frame: 1000, .. }));
        assert!(looped);
    }
}
