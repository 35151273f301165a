/// A linear gain ramp on the sample clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    pub start_value: f32,
    pub end_value: f32,
    pub start_frame: u64,
    pub duration_frames: u64,
}

impl GainRamp {
    pub fn new(start_value: f32, end_value: f32, start_frame: u64, duration_frames: u64) -> Self {
        Self {
            start_value,
            end_value,
            start_frame,
            duration_frames,
        }
    }

    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.duration_frames
    }

    /// Gain at `frame`, holding the endpoints outside the ramp.
    #[inline]
    pub fn value_at(&self, frame: u64) -> f32 {
        if frame <= self.start_frame {
            return if self.duration_frames == 0 {
                self.end_value
            } else {
                self.start_value
            };
        }
        if frame >= self.end_frame() {
            return self.end_value;
        }
        let t = (frame - self.start_frame) as f64 / self.duration_frames as f64;
        self.start_value + (self.end_value - self.start_value) * t as f32
    }

    pub fn is_finished(&self, frame: u64) -> bool {
        frame >= self.end_frame()
    }
}

/// A ramp requested but not yet reached on the clock.
///
/// The start value is taken from the stem's gain at `start_frame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingRamp {
    pub target: f32,
    pub start_frame: u64,
    pub duration_frames: u64,
}

/// Gain sub-state of a stem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainState {
    Idle,
    Ramping(GainRamp),
}
