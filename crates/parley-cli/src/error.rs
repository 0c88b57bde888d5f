//! CLI-specific error types and exit codes.

use parley_core::{EndpointError, SettingsError};
use parley_voice::VoiceError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument or endpoint problem.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (settings file or WAV input).
    #[error("IO error: {0}")]
    Io(String),

    /// Settings failed to parse or validate.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio device could not be opened.
    #[error("Audio device error: {0}")]
    Device(String),

    /// The session ended without completing.
    #[error("Session ended: {0}")]
    Session(String),
}

impl CliError {
    /// Map error to an exit code.
    ///
    /// Exit codes follow sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 64, // EX_USAGE
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Device(_) => 71,    // EX_OSERR
            Self::Session(_) => 69,   // EX_UNAVAILABLE
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<EndpointError> for CliError {
    fn from(err: EndpointError) -> Self {
        Self::Arguments(err.to_string())
    }
}

impl From<VoiceError> for CliError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Io(e) => Self::Io(e.to_string()),
            VoiceError::DecodeError(msg) => Self::Io(msg),
            VoiceError::ModelNotFound(path) => Self::Io(format!("VAD model not found: {}", path.display())),
            VoiceError::ModelLoadError(msg) => Self::Config(msg),
            other => Self::Device(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
