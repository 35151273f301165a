mod batch_resampler;
#[cfg(test)]
pub(crate) mod fixtures;
mod library;
mod load_options;
mod loader;
mod symphonia_loader;

use crate::error::{Result, SoundWalkError};
pub use batch_resampler::BatchResampler;
pub use library::{AUDIO_EXTENSIONS, AudioLibrary, AudioSourceResolver};
pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::AudioDataLoader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
pub use symphonia_loader::SymphoniaLoader;

/// Decoded, fixed-length PCM shared between the control side and the renderer.
///
/// # Data Format
/// Samples are stored **INTERLEAVED**: stereo is `[L0, R0, L1, R1, ...]`,
/// mono is `[M0, M1, ...]`. One frame holds one sample per channel.
#[derive(Debug, Clone)]
pub struct AudioClip {
    inner: Arc<ClipInner>,
}

#[derive(Debug)]
struct ClipInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl AudioClip {
    /// Wrap interleaved samples.
    ///
    /// # Errors
    ///
    /// `AudioFormat` if the rate or channel count is zero, or the sample count
    /// is not a whole number of frames.
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(SoundWalkError::AudioFormat(format!(
                "invalid clip layout: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(SoundWalkError::AudioFormat(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let total_frames = samples.len() / channels as usize;
        Ok(Self {
            inner: Arc::new(ClipInner {
                samples,
                sample_rate,
                channels,
                total_frames,
            }),
        })
    }

    /// Decode a file with the default loader and options.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        SymphoniaLoader.load(path.as_ref(), &LoadOptions::default())
    }

    /// Decode a file with a specific loader.
    pub fn from_path_with_loader<L: AudioDataLoader + ?Sized>(
        path: impl AsRef<Path>,
        loader: &L,
        options: &LoadOptions,
    ) -> Result<Self> {
        loader.load(path.as_ref(), options)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.inner.total_frames as f64 / self.inner.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.total_frames == 0
    }

    /// Sample `channel` of `frame`. Out-of-range channels wrap, so a mono
    /// clip feeds every output channel.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.inner.channels as usize;
        self.inner.samples[frame * channels + channel % channels]
    }

    /// Average all channels down to one.
    pub fn to_mono(&self) -> Self {
        if self.inner.channels == 1 {
            return self.clone();
        }

        let channels = self.inner.channels as usize;
        let samples = self
            .inner
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Self {
            inner: Arc::new(ClipInner {
                samples,
                sample_rate: self.inner.sample_rate,
                channels: 1,
                total_frames: self.inner.total_frames,
            }),
        }
    }

    /// Resample with rubato.
    ///
    /// The output holds exactly `round(frames * target / source)` frames, so
    /// clips of equal duration stay equal length after conversion.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = BatchResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;
        let expected_frames = resampler.output_frames(self.inner.total_frames);
        let samples = resampler.resample_interleaved(&self.inner.samples, expected_frames)?;

        Self::from_interleaved(samples, target_sample_rate, self.inner.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_partial_frames() {
        assert!(AudioClip::from_interleaved(vec![0.0; 3], 48000, 2).is_err());
        assert!(AudioClip::from_interleaved(vec![0.0; 4], 0, 2).is_err());
        let clip = AudioClip::from_interleaved(vec![0.0; 4], 48000, 2).unwrap();
        assert_eq!(clip.total_frames(), 2);
    }

    #[test]
    fn test_mono_sample_wraps_channels() {
        let clip = AudioClip::from_interleaved(vec![0.1, 0.2, 0.3], 8000, 1).unwrap();
        assert_eq!(clip.sample(1, 0), 0.2);
        assert_eq!(clip.sample(1, 1), 0.2);
    }

    #[test]
    fn test_to_mono_averages() {
        let clip = AudioClip::from_interleaved(vec![1.0, 0.0, 0.5, 0.5], 8000, 2).unwrap();
        let mono = clip.to_mono();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.samples(), &[0.5f32, 0.5]);
    }

    #[test]
    fn test_resample_keeps_exact_length() {
        let frames = 44_100;
        let samples: Vec<f32> = (0..frames * 2)
            .map(|i| ((i / 2) as f32 * 0.01).sin())
            .collect();
        let clip = AudioClip::from_interleaved(samples, 44_100, 2).unwrap();

        let resampled = clip.resample(48_000).unwrap();
        assert_eq!(resampled.sample_rate(), 48_000);
        assert_eq!(resampled.channels(), 2);
        assert_eq!(resampled.total_frames(), 48_000);
        approx::assert_relative_eq!(resampled.duration().as_secs_f64(), 1.0, epsilon = 1e-9);
    }
}
