use crate::audio_data::AudioClip;
use crate::events::TransportEvent;
use crate::transport::ramp::{GainRamp, GainState, PendingRamp};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Playback state of a stem. `Looping` lasts until teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Scheduled,
    Looping,
}

impl PlayState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Scheduled => 1,
            Self::Looping => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Scheduled,
            2 => Self::Looping,
            _ => Self::Stopped,
        }
    }
}

/// Lock-free view of a voice for the control side.
#[derive(Debug)]
pub(crate) struct StemProbe {
    gain_bits: AtomicU32,
    state: AtomicU8,
}

impl StemProbe {
    pub fn new(gain: f32) -> Self {
        Self {
            gain_bits: AtomicU32::new(gain.to_bits()),
            state: AtomicU8::new(PlayState::Stopped.to_u8()),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: PlayState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }
}

/// Render-side state of one looping stem.
pub(crate) struct StemVoice {
    id: String,
    clip: AudioClip,
    probe: Arc<StemProbe>,
    state: PlayState,
    start_frame: u64,
    cursor: usize,
    loop_count: u32,
    gain: f32,
    gain_state: GainState,
    pending: Option<PendingRamp>,
}

impl StemVoice {
    pub fn new(id: String, clip: AudioClip, gain: f32, probe: Arc<StemProbe>) -> Self {
        probe.set_gain(gain);
        probe.set_state(PlayState::Stopped);
        Self {
            id,
            clip,
            probe,
            state: PlayState::Stopped,
            start_frame: 0,
            cursor: 0,
            loop_count: 0,
            gain,
            gain_state: GainState::Idle,
            pending: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Arrange for playback to begin at `t0_frame`.
    pub fn schedule(&mut self, t0_frame: u64) {
        self.state = PlayState::Scheduled;
        self.start_frame = t0_frame;
        self.cursor = 0;
        self.loop_count = 0;
        self.probe.set_state(self.state);
    }

    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.gain_state = GainState::Idle;
        self.pending = None;
        self.probe.set_state(self.state);
    }

    /// Replace any pending or in-flight ramp with a new one starting at
    /// `start_frame`. The old ramp stops where it is.
    pub fn set_ramp(
        &mut self,
        target: f32,
        start_frame: u64,
        duration_frames: u64,
        now: u64,
        events: &mut Vec<TransportEvent>,
    ) {
        self.cancel_ramps(now, events);
        self.pending = Some(PendingRamp {
            target,
            start_frame,
            duration_frames,
        });
    }

    pub fn set_gain_immediate(&mut self, gain: f32, now: u64, events: &mut Vec<TransportEvent>) {
        self.cancel_ramps(now, events);
        self.gain = gain;
        self.probe.set_gain(gain);
    }

    /// Freeze at the current gain.
    pub fn hold(&mut self, now: u64, events: &mut Vec<TransportEvent>) {
        self.cancel_ramps(now, events);
    }

    fn cancel_ramps(&mut self, now: u64, events: &mut Vec<TransportEvent>) {
        let had_ramp = self.pending.take().is_some()
            | matches!(self.gain_state, GainState::Ramping(_));
        self.gain_state = GainState::Idle;
        if had_ramp {
            events.push(TransportEvent::RampSuperseded {
                stem_id: self.id.clone(),
                frame: now,
            });
        }
    }

    fn advance_gain(&mut self, frame: u64, events: &mut Vec<TransportEvent>) {
        if self.pending.is_some_and(|p| frame >= p.start_frame) {
            if let Some(p) = self.pending.take() {
                let ramp = GainRamp::new(self.gain, p.target, p.start_frame, p.duration_frames);
                events.push(TransportEvent::RampStarted {
                    stem_id: self.id.clone(),
                    from: self.gain,
                    to: p.target,
                    frame,
                });
                self.gain_state = GainState::Ramping(ramp);
            }
        }

        if let GainState::Ramping(ramp) = self.gain_state {
            self.gain = ramp.value_at(frame);
            if ramp.is_finished(frame) {
                self.gain_state = GainState::Idle;
                events.push(TransportEvent::RampCompleted {
                    stem_id: self.id.clone(),
                    gain: self.gain,
                    frame,
                });
            }
        }
    }

    /// Add this stem into `out` (interleaved, `channels` wide) for the block
    /// whose first frame is `block_start`.
    ///
    /// Loops are tail-chained: the frame after the last sample of one pass is
    /// the first sample of the next, so boundaries fall at `T0 + k * len`.
    pub fn render(
        &mut self,
        out: &mut [f32],
        channels: usize,
        block_start: u64,
        events: &mut Vec<TransportEvent>,
    ) {
        let len = self.clip.total_frames();
        if self.state == PlayState::Stopped || len == 0 {
            return;
        }
        let frames = out.len() / channels;

        for i in 0..frames {
            let frame = block_start + i as u64;
            self.advance_gain(frame, events);

            if self.state == PlayState::Scheduled {
                if frame < self.start_frame {
                    continue;
                }
                self.begin(frame, len, events);
            }

            let base = i * channels;
            for ch in 0..channels {
                out[base + ch] += self.clip.sample(self.cursor, ch) * self.gain;
            }

            self.cursor += 1;
            if self.cursor == len {
                self.cursor = 0;
                self.loop_count += 1;
                events.push(TransportEvent::StemLooped {
                    stem_id: self.id.clone(),
                    loop_count: self.loop_count,
                    frame: frame + 1,
                });
            }
        }

        self.probe.set_gain(self.gain);
    }

    fn begin(&mut self, frame: u64, len: usize, events: &mut Vec<TransportEvent>) {
        // A start that arrives late keeps the phase it would have had
        let elapsed = frame - self.start_frame;
        self.cursor = (elapsed % len as u64) as usize;
        self.loop_count = (elapsed / len as u64) as u32;
        self.state = PlayState::Looping;
        self.probe.set_state(self.state);
        events.push(TransportEvent::StemStarted {
            stem_id: self.id.clone(),
            frame,
        });
    }
}
