use crate::config::TransportDesc;

/// Musical time on top of the renderer's sample clock.
///
/// All positions are absolute frame indices. `T0` is fixed once by
/// [`start_at`](Self::start_at); every loop boundary and every quantized ramp
/// is measured from it.
#[derive(Debug, Clone)]
pub struct TransportClock {
    sample_rate: u32,
    bpm: f64,
    beats_per_bar: u32,
    t0: Option<u64>,
}

impl TransportClock {
    pub fn new(sample_rate: u32, bpm: f64, beats_per_bar: u32) -> Self {
        Self {
            sample_rate,
            bpm,
            beats_per_bar,
            t0: None,
        }
    }

    pub fn from_desc(desc: &TransportDesc) -> Self {
        Self::new(desc.sample_rate, desc.bpm, desc.beats_per_bar)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds per bar: `60 / bpm * beats_per_bar`.
    pub fn bar_duration(&self) -> f64 {
        60.0 / self.bpm * self.beats_per_bar as f64
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    pub fn start_at(&mut self, t0_frame: u64) {
        self.t0 = Some(t0_frame);
    }

    pub fn reset(&mut self) {
        self.t0 = None;
    }

    pub fn t0(&self) -> Option<u64> {
        self.t0
    }

    pub fn is_started(&self) -> bool {
        self.t0.is_some()
    }

    /// First frame at or after which a ramp requested at `now` may begin.
    ///
    /// - Before start (no `T0`): `now`.
    /// - Before `T0`: `T0` itself.
    /// - Otherwise: the first multiple of `bars` bars after `T0` that is
    ///   strictly later than `now`. `bars == 0` disables quantization.
    pub fn next_quantized_frame(&self, now: u64, bars: u32) -> u64 {
        let Some(t0) = self.t0 else {
            return now;
        };
        if now < t0 {
            return t0;
        }
        if bars == 0 {
            return now;
        }

        let quantum = self.bar_duration() * bars as f64;
        let elapsed = self.frames_to_seconds(now - t0);
        let mut k = (elapsed / quantum).floor() + 1.0;
        let mut frame = t0 + self.seconds_to_frames(k * quantum);

        // Rounding to whole frames can land on or before now
        while frame <= now {
            k += 1.0;
            frame = t0 + self.seconds_to_frames(k * quantum);
        }
        frame
    }
}

/// Seconds-relative-to-T0 form of the quantization rule.
pub fn next_quantized_time(elapsed_seconds: f64, quantum_seconds: f64) -> f64 {
    if elapsed_seconds < 0.0 {
        return 0.0;
    }
    ((elapsed_seconds / quantum_seconds).floor() + 1.0) * quantum_seconds
}
