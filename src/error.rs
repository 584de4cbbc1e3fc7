use std::io;
use thiserror::Error;

/// Startup configuration is missing or malformed. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file: {0}")]
    Read(#[from] io::Error),
    #[error("unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Raised while loading a sound asset from disk.
#[derive(Debug, Error)]
pub enum SoundError {
    #[error("failed to decode WAV data: {0}")]
    Decode(#[from] hound::Error),
    #[error("unsupported WAV format ({bits}-bit {format:?})")]
    UnsupportedFormat { bits: u16, format: hound::SampleFormat },
    #[error("unable to read sound root: {0}")]
    Pattern(#[from] glob::PatternError),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("sound resource not found: '{0}'")]
    ResourceNotFound(String),
    #[error("audio device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("failed to read input: {0}")]
    Read(String),
    #[error("failed to initialize hardware: {0}")]
    Init(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("no incoming caller named '{0}'")]
    UnknownCaller(String),
    #[error("an incoming ring is already in progress")]
    ConcurrentRingConflict,
    #[error("unable to start ring thread: {0}")]
    Spawn(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LanguageError {
    #[error("unsupported language code '{0}'")]
    Unsupported(String),
}
