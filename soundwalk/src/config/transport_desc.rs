use crate::error::{Result, SoundWalkError};
use serde::Deserialize;

/// Where rendered audio goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Open the default output device on start.
    #[default]
    Device,
    /// No device. The caller drives the sample clock with
    /// [`AudioTransport::render_block`](crate::transport::AudioTransport::render_block).
    Offline,
}

/// Configuration descriptor for the audio transport
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportDesc {
    /// Sample rate the stems are mixed at (and requested from the device)
    pub sample_rate: u32,
    /// Frames requested per device callback
    pub block_size: usize,
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Song tempo in beats per minute
    pub bpm: f64,
    /// Time signature numerator
    pub beats_per_bar: u32,
    /// Delay between `start_all` and the shared start instant T0
    pub preroll_seconds: f64,
    pub output: OutputMode,
}

impl Default for TransportDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 1024,
            channels: 2,
            bpm: 120.0,
            beats_per_bar: 4,
            preroll_seconds: 0.15,
            output: OutputMode::Device,
        }
    }
}

impl TransportDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn tempo(mut self, bpm: f64, beats_per_bar: u32) -> Self {
        self.bpm = bpm;
        self.beats_per_bar = beats_per_bar;
        self
    }

    pub fn preroll_seconds(mut self, seconds: f64) -> Self {
        self.preroll_seconds = seconds;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Duration of one bar in seconds: `60 / bpm * beats_per_bar`.
    pub fn bar_duration(&self) -> f64 {
        60.0 / self.bpm * self.beats_per_bar as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SoundWalkError::Configuration(
                "sample_rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 {
            return Err(SoundWalkError::Configuration(
                "channels must be greater than 0".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(SoundWalkError::Configuration(
                "block_size must be greater than 0".into(),
            ));
        }
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(SoundWalkError::Configuration(format!(
                "bpm must be positive, got {}",
                self.bpm
            )));
        }
        if self.beats_per_bar == 0 {
            return Err(SoundWalkError::Configuration(
                "beats_per_bar must be greater than 0".into(),
            ));
        }
        if !(self.preroll_seconds.is_finite() && self.preroll_seconds >= 0.0) {
            return Err(SoundWalkError::Configuration(format!(
                "preroll_seconds must be non-negative, got {}",
                self.preroll_seconds
            )));
        }
        Ok(())
    }
}
