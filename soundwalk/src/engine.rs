use crate::config::TransportDesc;
use crate::error::{Result, SoundWalkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Callback function type for filling audio samples
///
/// The callback receives:
/// - `buffer`: interleaved slice to fill with audio samples
/// - `sample_rate`: target sample rate for the samples
/// - `channels`: number of audio channels
///
/// Returns the number of frames actually filled (frames = samples / channels)
pub type AudioFillCallback = dyn Fn(&mut [f32], u32, u16) -> usize + Send + Sync;

/// Owns the cpal output stream and pulls blocks from a fill callback.
pub struct AudioEngine {
    desc: TransportDesc,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicU64>,
    fill_callback: Option<Arc<AudioFillCallback>>,
}

impl AudioEngine {
    pub fn new(desc: TransportDesc) -> Self {
        Self {
            desc,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicU64::new(0)),
            fill_callback: None,
        }
    }

    /// Set the callback invoked from the audio thread for every buffer.
    ///
    /// The callback must not block.
    pub fn set_fill_callback<F>(&mut self, callback: F)
    where
        F: Fn(&mut [f32], u32, u16) -> usize + Send + Sync + 'static,
    {
        self.fill_callback = Some(Arc::new(callback));
    }

    /// Open the default output device and start pulling audio.
    ///
    /// Safe to call again after a failure; a running engine is left alone.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let fill_callback = self
            .fill_callback
            .clone()
            .ok_or_else(|| SoundWalkError::Engine("No fill callback set".into()))?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            SoundWalkError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(self.desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            SoundWalkError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config, fill_callback)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config, fill_callback)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config, fill_callback)?,
            other => {
                return Err(SoundWalkError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| SoundWalkError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Audio engine started: {} Hz, {} ch, {} frame blocks",
            self.desc.sample_rate,
            self.desc.channels,
            self.desc.block_size
        );

        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Audio engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames delivered to the device since construction.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &TransportDesc {
        &self.desc
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        fill_callback: Arc<AudioFillCallback>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let sample_rate = self.desc.sample_rate;
        let channels = self.desc.channels;
        let mut scratch: Vec<f32> = Vec::with_capacity(self.desc.block_size * channels as usize);

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    // Grows only if the device hands us a larger buffer than requested
                    scratch.resize(data.len(), 0.0);
                    let frames_filled = fill_callback(&mut scratch, sample_rate, channels);

                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(*sample);
                    }

                    frames_processed.fetch_add(frames_filled as u64, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SoundWalkError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
