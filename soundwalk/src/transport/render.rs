// Render side of the transport. Runs inside the audio callback (or the
// caller's thread in offline mode); never blocks and never logs per block.

use crate::events::TransportEvent;
use crate::transport::command::TransportCommand;
use crate::transport::stem::StemVoice;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct TransportRenderer {
    voices: Vec<StemVoice>,
    commands: Receiver<TransportCommand>,
    events: Sender<TransportEvent>,
    /// Frames rendered so far; the transport's notion of "now".
    clock: Arc<AtomicU64>,
    channels: usize,
    pending_events: Vec<TransportEvent>,
    /// Shared with the control side so it never has to lock the renderer.
    dropped_events: Arc<AtomicU64>,
}

impl TransportRenderer {
    pub fn new(
        commands: Receiver<TransportCommand>,
        events: Sender<TransportEvent>,
        clock: Arc<AtomicU64>,
        dropped_events: Arc<AtomicU64>,
        channels: u16,
    ) -> Self {
        Self {
            voices: Vec::new(),
            commands,
            events,
            clock,
            channels: channels as usize,
            pending_events: Vec::with_capacity(64),
            dropped_events,
        }
    }

    /// Apply every queued command at the current clock position.
    pub fn drain_commands(&mut self) {
        let now = self.clock.load(Ordering::Acquire);
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command, now);
        }
        self.flush_events();
    }

    fn apply(&mut self, command: TransportCommand, now: u64) {
        let events = &mut self.pending_events;
        match command {
            TransportCommand::AddStem(voice) => self.voices.push(*voice),
            TransportCommand::StartAt { t0_frame } => {
                for voice in &mut self.voices {
                    voice.schedule(t0_frame);
                }
            }
            TransportCommand::SetGain {
                stem_id,
                target,
                start_frame,
                duration_frames,
            } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id() == stem_id) {
                    voice.set_ramp(target, start_frame, duration_frames, now, events);
                }
            }
            TransportCommand::SetGainImmediate { stem_id, gain } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id() == stem_id) {
                    voice.set_gain_immediate(gain, now, events);
                }
            }
            TransportCommand::HoldGain { stem_id } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id() == stem_id) {
                    voice.hold(now, events);
                }
            }
            TransportCommand::StopAll => {
                for voice in &mut self.voices {
                    voice.stop();
                }
                events.push(TransportEvent::AllStopped);
            }
        }
    }

    /// Render one interleaved block and advance the clock by its length.
    ///
    /// Returns the number of frames rendered.
    pub fn process_block(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        self.drain_commands();

        let frames = out.len() / self.channels;
        let block_start = self.clock.load(Ordering::Acquire);

        for voice in &mut self.voices {
            voice.render(out, self.channels, block_start, &mut self.pending_events);
        }

        self.clock
            .store(block_start + frames as u64, Ordering::Release);
        self.flush_events();
        frames
    }

    fn flush_events(&mut self) {
        for event in self.pending_events.drain(..) {
            if self.events.try_send(event).is_err() {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
