use crate::audio_data::{AudioClip, AudioDataLoader, LoadOptions, SymphoniaLoader};
use crate::error::{Result, SoundWalkError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// File extensions recognised as audio, in lookup order.
pub const AUDIO_EXTENSIONS: &[&str] = &["m4a", "wav", "mp3", "caf", "flac", "ogg"];

/// Turns a catalog filename into decoded audio.
pub trait AudioSourceResolver {
    /// # Errors
    ///
    /// `NotFound` if no location holds `filename`.
    fn resolve(&self, filename: &str) -> Result<AudioClip>;
}

/// Audio files spread over a writable user directory and a read-only bundle.
///
/// The user directory wins when both hold the same name.
pub struct AudioLibrary {
    user_dir: Option<PathBuf>,
    bundle_dir: Option<PathBuf>,
    options: LoadOptions,
    loader: Box<dyn AudioDataLoader>,
}

impl AudioLibrary {
    pub fn new(user_dir: Option<PathBuf>, bundle_dir: Option<PathBuf>) -> Self {
        Self {
            user_dir,
            bundle_dir,
            options: LoadOptions::default(),
            loader: Box::new(SymphoniaLoader),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn AudioDataLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    fn search_dirs(&self) -> impl Iterator<Item = &Path> {
        self.user_dir
            .as_deref()
            .into_iter()
            .chain(self.bundle_dir.as_deref())
    }

    /// Locate `filename` on disk.
    ///
    /// A name without an extension matches any of [`AUDIO_EXTENSIONS`].
    pub fn resolve_path(&self, filename: &str) -> Result<PathBuf> {
        let has_extension = Path::new(filename).extension().is_some();

        for dir in self.search_dirs() {
            if has_extension {
                let candidate = dir.join(filename);
                if candidate.is_file() {
                    return Ok(candidate);
                }
                continue;
            }
            for ext in AUDIO_EXTENSIONS {
                let candidate = dir.join(format!("{}.{}", filename, ext));
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(SoundWalkError::NotFound(format!("audio source '{}'", filename)))
    }

    /// Every audio file name across both directories, deduplicated and sorted.
    pub fn library_files(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for dir in self.search_dirs() {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::debug!("Skipping audio directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if is_audio_file(&path) {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        names.into_iter().collect()
    }
}

impl AudioSourceResolver for AudioLibrary {
    fn resolve(&self, filename: &str) -> Result<AudioClip> {
        let path = self.resolve_path(filename)?;
        self.loader.load(&path, &self.options)
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::fixtures::write_test_tone;
    use tempfile::tempdir;

    #[test]
    fn test_user_dir_takes_precedence() {
        let user = tempdir().unwrap();
        let bundle = tempdir().unwrap();
        write_test_tone(&user.path().join("drums.wav"), 8000);
        write_test_tone(&bundle.path().join("drums.wav"), 16000);
        write_test_tone(&bundle.path().join("pads.wav"), 16000);

        let library = AudioLibrary::new(
            Some(user.path().to_path_buf()),
            Some(bundle.path().to_path_buf()),
        );

        assert_eq!(library.resolve("drums.wav").unwrap().sample_rate(), 8000);
        assert_eq!(library.resolve("pads.wav").unwrap().sample_rate(), 16000);
        assert_eq!(
            library.resolve_path("pads").unwrap(),
            bundle.path().join("pads.wav")
        );
        assert_eq!(library.library_files(), vec!["drums.wav", "pads.wav"]);
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let bundle = tempdir().unwrap();
        let library = AudioLibrary::new(None, Some(bundle.path().to_path_buf()));
        assert!(library.resolve("nope.wav").unwrap_err().is_not_found());
        assert!(library.resolve("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_library_ignores_non_audio_and_missing_dirs() {
        let user = tempdir().unwrap();
        std::fs::write(user.path().join("notes.txt"), b"hi").unwrap();
        write_test_tone(&user.path().join("vox.wav"), 8000);

        let library = AudioLibrary::new(
            Some(user.path().to_path_buf()),
            Some(PathBuf::from("/does/not/exist")),
        );
        assert_eq!(library.library_files(), vec!["vox.wav"]);
    }

    #[test]
    fn test_resample_on_load() {
        let user = tempdir().unwrap();
        write_test_tone(&user.path().join("bass.wav"), 8000);
        let library = AudioLibrary::new(Some(user.path().to_path_buf()), None)
            .with_options(LoadOptions::new().target_sample_rate(16000));

        let clip = library.resolve("bass.wav").unwrap();
        assert_eq!(clip.sample_rate(), 16000);
        assert_eq!(clip.total_frames(), 16000);
    }
}
