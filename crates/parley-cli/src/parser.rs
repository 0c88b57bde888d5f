//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use parley_core::CaptureMode;

/// Command-line interface for a single spoken session.
///
/// Every connection option can also come from the environment (or a `.env`
/// file), so tokens need not appear in shell history.
#[derive(Debug, Parser)]
#[command(name = "parley")]
#[command(about = "Hold a spoken conversation with a parley session server")]
#[command(version)]
pub struct Cli {
    /// Session server base URL (ws:// or wss://)
    #[arg(long = "server-url", env = "PARLEY_SERVER_URL")]
    pub server_url: Option<String>,

    /// Session to join
    #[arg(long = "session-id", env = "PARLEY_SESSION_ID")]
    pub session_id: String,

    /// Access token for the session
    #[arg(long = "token", env = "PARLEY_TOKEN", hide_env_values = true)]
    pub token: String,

    /// JSON settings file; flags override its values
    #[arg(long = "config", env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// How speech is uploaded: `streaming` or `utterance`
    #[arg(long = "capture-mode")]
    pub capture_mode: Option<CaptureMode>,

    /// Play a WAV file as the microphone instead of a real device
    #[arg(long = "input-wav")]
    pub input_wav: Option<PathBuf>,

    /// Silero VAD model (`silero_vad.onnx`); energy detection is used without it
    #[arg(long = "vad-model", env = "PARLEY_VAD_MODEL")]
    pub vad_model: Option<PathBuf>,

    /// Give up after this many consecutive failed connection attempts
    #[arg(long = "max-reconnect-attempts")]
    pub max_reconnect_attempts: Option<u32>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
