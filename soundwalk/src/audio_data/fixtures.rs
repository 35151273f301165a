use std::io::Write;
use std::path::Path;

/// Minimal 16-bit PCM WAV writer.
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let data_len = (samples.len() * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    bytes.extend_from_slice(&(channels * 2).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    std::fs::File::create(path)
        .and_then(|mut f| f.write_all(&bytes))
        .unwrap();
}

/// One second of a quiet mono ramp.
pub(crate) fn write_test_tone(path: &Path, sample_rate: u32) {
    let samples: Vec<i16> = (0..sample_rate).map(|i| (i % 200) as i16 * 10).collect();
    write_wav(path, sample_rate, 1, &samples);
}

/// Minimal big-endian 16-bit linear PCM CAF writer.
pub(crate) fn write_caf(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"caff");
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());

    bytes.extend_from_slice(b"desc");
    bytes.extend_from_slice(&32i64.to_be_bytes());
    bytes.extend_from_slice(&(sample_rate as f64).to_be_bytes());
    bytes.extend_from_slice(b"lpcm");
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&(channels as u32 * 2).to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&(channels as u32).to_be_bytes());
    bytes.extend_from_slice(&16u32.to_be_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(4 + samples.len() as i64 * 2).to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    for s in samples {
        bytes.extend_from_slice(&s.to_be_bytes());
    }
    std::fs::File::create(path)
        .and_then(|mut f| f.write_all(&bytes))
        .unwrap();
}
