//! Error types for deckmix.

use thiserror::Error;

/// Result type alias using deckmix's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for deckmix.
#[derive(Error, Debug)]
pub enum Error {
    // Parameter errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown pad: {0}")]
    UnknownPad(usize),

    // Loading errors
    #[error("Failed to load {locator}: {reason}")]
    LoadFailed { locator: String, reason: String },

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Resample error: {0}")]
    Resample(String),

    // Output errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Engine lifecycle
    #[error("Engine worker has stopped")]
    EngineStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a decode-side failure with the locator that caused it.
    pub fn load_failed(locator: &str, cause: &Self) -> Self {
        Self::LoadFailed {
            locator: locator.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Returns true if this error rejected a parameter without side effects.
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::UnknownPad(_))
    }

    /// Returns true if this error came from loading a track.
    pub const fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::LoadFailed { .. }
                | Self::AudioDecode(_)
                | Self::UnsupportedFormat(_)
                | Self::Resample(_)
        )
    }
}
