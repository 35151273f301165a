/// Channel handling at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertToMono {
    /// Keep the file's channel layout.
    #[default]
    Original,
    /// Average all channels into one.
    ForceMono,
}

/// Options applied after decoding.
///
/// # Examples
///
/// ```no_run
/// # use soundwalk::audio_data::{LoadOptions, ConvertToMono};
/// let options = LoadOptions::new()
///     .convert_to_mono(ConvertToMono::ForceMono)
///     .target_sample_rate(48_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub convert_to_mono: ConvertToMono,
    /// Resample to this rate when it differs from the file's.
    pub target_sample_rate: Option<u32>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }

    pub fn target_sample_rate(mut self, sample_rate: u32) -> Self {
        self.target_sample_rate = Some(sample_rate);
        self
    }
}
