use crate::error::{Result, SoundWalkError};
use rubato::{FftFixedIn, Resampler};

/// Offline sample-rate conversion for whole clips.
pub struct BatchResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl BatchResampler {
    /// # Arguments
    /// * `source_sample_rate` - Rate of the input audio
    /// * `target_sample_rate` - Rate of the output audio
    /// * `channels` - Channel count of the interleaved data
    /// * `chunk_size` - Input chunk size hint (defaults to 1024)
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(SoundWalkError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(SoundWalkError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    /// Frames a clip of `source_frames` occupies at the target rate.
    pub fn output_frames(&self, source_frames: usize) -> usize {
        (source_frames as f64 * self.resample_ratio()).round() as usize
    }

    /// Resamples one planar channel to exactly `output_frames` frames.
    ///
    /// The resampler's filter delay is dropped from the front, and the input
    /// is flushed with silence until enough output exists.
    pub fn resample_channel(&self, channel_samples: &[f32], output_frames: usize) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            let mut out = channel_samples.to_vec();
            out.resize(output_frames, 0.0);
            return Ok(out);
        }
        if output_frames == 0 {
            return Ok(Vec::new());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1,
        )
        .map_err(|e| SoundWalkError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let chunk = resampler.input_frames_next();
        let delay = resampler.output_delay();
        let wanted = delay + output_frames;

        let mut output = Vec::with_capacity(wanted + chunk * 2);
        let mut input_chunk = vec![0.0f32; chunk];
        let mut input_index = 0;

        while output.len() < wanted {
            let take = (channel_samples.len() - input_index).min(chunk);
            input_chunk.fill(0.0);
            input_chunk[..take].copy_from_slice(&channel_samples[input_index..input_index + take]);
            input_index += take;

            let waves_out = resampler
                .process(std::slice::from_ref(&input_chunk), None)
                .map_err(|e| SoundWalkError::AudioLoading(format!("Resampling error: {}", e)))?;

            if let Some(first_channel) = waves_out.first() {
                output.extend_from_slice(first_channel);
            }
        }

        output.drain(..delay);
        output.truncate(output_frames);
        Ok(output)
    }

    /// Resamples interleaved data to exactly `output_frames` frames per channel.
    pub fn resample_interleaved(&self, interleaved: &[f32], output_frames: usize) -> Result<Vec<f32>> {
        let channels = self.channels as usize;

        let resampled: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                let planar: Vec<f32> = interleaved
                    .chunks(channels)
                    .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                    .collect();
                self.resample_channel(&planar, output_frames)
            })
            .collect::<Result<_>>()?;

        let mut out = Vec::with_capacity(output_frames * channels);
        for frame in 0..output_frames {
            for channel in &resampled {
                out.push(channel[frame]);
            }
        }
        Ok(out)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Target over source rate; above 1.0 means upsampling.
    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}
