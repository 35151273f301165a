use crate::{
    audio_data::{AudioClip, AudioDataLoader, ConvertToMono, LoadOptions},
    error::{Result, SoundWalkError},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Default loader: decodes WAV, MP3, AAC/M4A, FLAC, OGG and friends with
/// symphonia into f32 PCM, then applies [`LoadOptions`].
pub struct SymphoniaLoader;

impl AudioDataLoader for SymphoniaLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<AudioClip> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SoundWalkError::NotFound(format!("audio file {}", path.display()))
            }
            _ => SoundWalkError::Io(e),
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                SoundWalkError::AudioLoading(format!("Failed to probe audio format: {:?}", e))
            })?;

        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            SoundWalkError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| SoundWalkError::AudioLoading("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| SoundWalkError::AudioLoading("Channel count not found".to_string()))?
            .count() as u16;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                SoundWalkError::AudioLoading(format!("Failed to create decoder: {:?}", e))
            })?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-file
                Err(e) => {
                    return Err(SoundWalkError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(_)) => continue, // recoverable corruption
                Err(e) => {
                    return Err(SoundWalkError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            samples.extend_from_slice(tmp.samples());
        }

        let mut clip = AudioClip::from_interleaved(samples, sample_rate, channels)?;
        if clip.is_empty() {
            return Err(SoundWalkError::AudioLoading(format!(
                "{} decoded to zero frames",
                path.display()
            )));
        }

        if options.convert_to_mono == ConvertToMono::ForceMono {
            clip = clip.to_mono();
        }
        if let Some(rate) = options.target_sample_rate {
            clip = clip.resample(rate)?;
        }

        log::debug!(
            "Decoded {} ({} frames, {} Hz, {} ch)",
            path.display(),
            clip.total_frames(),
            clip.sample_rate(),
            clip.channels()
        );
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::fixtures::{write_caf, write_wav};

    #[test]
    fn test_missing_file_is_not_found() {
        let err = SymphoniaLoader
            .load(Path::new("/definitely/not/here.wav"), &LoadOptions::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_decodes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let frames: Vec<i16> = (0..8000).flat_map(|i| [i as i16, -(i as i16)]).collect();
        write_wav(&path, 8000, 2, &frames);

        let clip = SymphoniaLoader.load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(clip.sample_rate(), 8000);
        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.total_frames(), 8000);

        let mono = SymphoniaLoader
            .load(&path, &LoadOptions::new().convert_to_mono(ConvertToMono::ForceMono))
            .unwrap();
        assert_eq!(mono.channels(), 1);
        approx::assert_abs_diff_eq!(mono.sample(100, 0), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_decodes_caf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.caf");
        let samples: Vec<i16> = (0..4000).map(|i| (i % 100) as i16 * 100).collect();
        write_caf(&path, 4000, 1, &samples);

        let clip = SymphoniaLoader.load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(clip.sample_rate(), 4000);
        assert_eq!(clip.channels(), 1);
        assert_eq!(clip.total_frames(), 4000);
    }
}
