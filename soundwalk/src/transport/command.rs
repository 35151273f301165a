use crate::transport::stem::StemVoice;

/// Control-side requests, applied by the renderer at the start of a block.
pub(crate) enum TransportCommand {
    AddStem(Box<StemVoice>),
    /// Schedule every stem to begin at this frame.
    StartAt { t0_frame: u64 },
    SetGain {
        stem_id: String,
        target: f32,
        start_frame: u64,
        duration_frames: u64,
    },
    SetGainImmediate { stem_id: String, gain: f32 },
    HoldGain { stem_id: String },
    StopAll,
}
