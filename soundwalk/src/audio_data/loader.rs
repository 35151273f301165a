use crate::audio_data::{AudioClip, LoadOptions};
use crate::error::Result;
use std::path::Path;

/// Decodes an audio file into an [`AudioClip`].
///
/// [`SymphoniaLoader`](crate::audio_data::SymphoniaLoader) is the default;
/// implement this to plug in another decoder.
pub trait AudioDataLoader: Send + Sync {
    /// Loads and decodes `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist, `AudioLoading` if it cannot be
    /// decoded.
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<AudioClip>;
}
