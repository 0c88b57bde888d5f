//! Voice engine error types.

use std::path::PathBuf;

/// Errors that can occur in the voice engine.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// No audio output device found.
    #[error("No audio output device found")]
    NoOutputDevice,

    /// Failed to open audio input stream.
    #[error("Failed to open audio input stream: {0}")]
    InputStreamError(String),

    /// Failed to open audio output stream.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// Synthesized audio could not be decoded.
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    /// Captured audio could not be encoded for upload.
    #[error("Failed to encode audio: {0}")]
    EncodeError(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// Speech detection model file not found.
    #[error("VAD model not found: {0}")]
    ModelNotFound(PathBuf),

    /// Speech detection model could not be loaded.
    #[error("Failed to load VAD model: {0}")]
    ModelLoadError(String),

    /// Capture is already running.
    #[error("Audio capture is already active")]
    AlreadyActive,

    /// IO error (WAV files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => Self::Io(io),
            other => Self::DecodeError(other.to_string()),
        }
    }
}
