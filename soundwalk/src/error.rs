//! Error types for SoundWalk

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoundWalkError {
    /// An audio source, stem or zone could not be resolved.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Zone catalog error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Location error: {0}")]
    Location(String),
}

impl SoundWalkError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SoundWalkError>;
