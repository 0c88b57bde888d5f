//! Session settings and validation.
//!
//! Pure domain types with no infrastructure dependencies. Defaults match the
//! interview client the protocol was designed for.

use serde::{Deserialize, Serialize};

/// Default idle threshold before a nudge is requested.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 12_000;

/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;

/// Sample rate of captured speech sent to the peer.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Utterances shorter than this are treated as noise.
pub const DEFAULT_MIN_SPEECH_DURATION_MS: u64 = 250;

/// Captured speech is uploaded in chunks of this length while streaming.
pub const DEFAULT_STREAM_CHUNK_MS: u64 = 500;

/// How long a timer warning stays on screen before the prior status returns.
pub const DEFAULT_WARNING_DISPLAY_MS: u64 = 4_000;

/// How captured speech reaches the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// `start_speech_stream`, periodic `audio_chunk`s, then `end_speech_stream`.
    #[default]
    Streaming,

    /// One `user_audio` message per valid utterance.
    Utterance,
}

impl std::str::FromStr for CaptureMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streaming" | "stream" => Ok(Self::Streaming),
            "utterance" => Ok(Self::Utterance),
            other => Err(SettingsError::UnknownCaptureMode(other.to_string())),
        }
    }
}

/// Voice-activity detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    /// Frames with speech probability at or above this start (or sustain) speech.
    pub positive_speech_threshold: f32,

    /// Frames below this count towards ending speech.
    pub negative_speech_threshold: f32,

    /// Frames of audio kept from before speech started.
    pub pre_speech_pad_frames: u32,

    /// Consecutive sub-threshold frames tolerated before speech ends.
    pub redemption_frames: u32,

    /// Samples per classified frame.
    pub frame_samples: u32,

    /// Utterances with fewer positive frames are misfires.
    pub min_speech_frames: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            positive_speech_threshold: 0.8,
            negative_speech_threshold: 0.5,
            pre_speech_pad_frames: 10,
            redemption_frames: 8,
            frame_samples: 512,
            min_speech_frames: 3,
        }
    }
}

/// Settings for one spoken session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Base websocket URL; the session id and token are appended.
    pub server_url: String,

    /// Silence before a `user_idle` nudge (ms).
    pub idle_timeout_ms: u64,

    /// Delay before reconnecting after a drop (ms).
    pub reconnect_interval_ms: u64,

    /// Give up after this many consecutive failed connection attempts.
    pub max_reconnect_attempts: Option<u32>,

    /// Sample rate of captured speech (Hz).
    pub sample_rate: u32,

    /// Shortest utterance that counts as a turn (ms).
    pub min_speech_duration_ms: u64,

    /// Length of each streamed upload chunk (ms).
    pub stream_chunk_ms: u64,

    /// How long a warning is displayed (ms).
    pub warning_display_ms: u64,

    /// How captured speech is sent.
    pub capture_mode: CaptureMode,

    /// Voice-activity detector parameters.
    pub vad: VadSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SessionSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            server_url: "ws://localhost:8000/interview".to_string(),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            min_speech_duration_ms: DEFAULT_MIN_SPEECH_DURATION_MS,
            stream_chunk_ms: DEFAULT_STREAM_CHUNK_MS,
            warning_display_ms: DEFAULT_WARNING_DISPLAY_MS,
            capture_mode: CaptureMode::Streaming,
            vad: VadSettings::default(),
        }
    }

    /// Number of samples in one streamed upload chunk.
    pub const fn stream_chunk_samples(&self) -> usize {
        (self.sample_rate as u64 * self.stream_chunk_ms / 1000) as usize
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Server URL cannot be empty")]
    EmptyServerUrl,

    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },

    #[error("Sample rate must be between 8000 and 48000 Hz, got {0}")]
    InvalidSampleRate(u32),

    #[error("Speech threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f32),

    #[error("Negative speech threshold ({negative}) cannot exceed positive threshold ({positive})")]
    ThresholdOrder { positive: f32, negative: f32 },

    #[error("VAD frame size must be between 64 and 8192 samples, got {0}")]
    InvalidFrameSize(u32),

    #[error("Redemption frames must be at least 1")]
    ZeroRedemptionFrames,

    #[error("Unknown capture mode '{0}' (expected streaming or utterance)")]
    UnknownCaptureMode(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &SessionSettings) -> Result<(), SettingsError> {
    if settings.server_url.trim().is_empty() {
        return Err(SettingsError::EmptyServerUrl);
    }

    for (name, value) in [
        ("idle_timeout_ms", settings.idle_timeout_ms),
        ("reconnect_interval_ms", settings.reconnect_interval_ms),
        ("stream_chunk_ms", settings.stream_chunk_ms),
        ("warning_display_ms", settings.warning_display_ms),
    ] {
        if value == 0 {
            return Err(SettingsError::ZeroDuration { name });
        }
    }

    if !(8_000..=48_000).contains(&settings.sample_rate) {
        return Err(SettingsError::InvalidSampleRate(settings.sample_rate));
    }

    let vad = &settings.vad;
    for threshold in [vad.positive_speech_threshold, vad.negative_speech_threshold] {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SettingsError::InvalidThreshold(threshold));
        }
    }
    if vad.negative_speech_threshold > vad.positive_speech_threshold {
        return Err(SettingsError::ThresholdOrder {
            positive: vad.positive_speech_threshold,
            negative: vad.negative_speech_threshold,
        });
    }

    if !(64..=8192).contains(&vad.frame_samples) {
        return Err(SettingsError::InvalidFrameSize(vad.frame_samples));
    }

    if vad.redemption_frames == 0 {
        return Err(SettingsError::ZeroRedemptionFrames);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::with_defaults();
        assert_eq!(settings.idle_timeout_ms, 12_000);
        assert_eq!(settings.reconnect_interval_ms, 3_000);
        assert_eq!(settings.sample_rate, 16_000);
        assert_eq!(settings.min_speech_duration_ms, 250);
        assert_eq!(settings.capture_mode, CaptureMode::Streaming);
        assert_eq!(settings.vad.frame_samples, 512);
        assert_eq!(settings.max_reconnect_attempts, None);
    }

    #[test]
    fn test_validate_settings_valid() {
        assert!(validate_settings(&SessionSettings::with_defaults()).is_ok());
    }

    #[test]
    fn test_stream_chunk_samples() {
        let settings = SessionSettings::with_defaults();
        assert_eq!(settings.stream_chunk_samples(), 8_000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"idle_timeout_ms": 15000, "vad": {"redemption_frames": 4}}"#)
                .unwrap();
        assert_eq!(settings.idle_timeout_ms, 15_000);
        assert_eq!(settings.vad.redemption_frames, 4);
        assert_eq!(settings.vad.frame_samples, 512);
        assert_eq!(settings.reconnect_interval_ms, 3_000);
    }

    #[test]
    fn test_capture_mode_from_json_and_str() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"capture_mode": "utterance"}"#).unwrap();
        assert_eq!(settings.capture_mode, CaptureMode::Utterance);
        assert_eq!("streaming".parse::<CaptureMode>(), Ok(CaptureMode::Streaming));
        assert!(matches!(
            "webm".parse::<CaptureMode>(),
            Err(SettingsError::UnknownCaptureMode(_))
        ));
    }

    #[test]
    fn test_validate_zero_idle_timeout() {
        let settings = SessionSettings {
            idle_timeout_ms: 0,
            ..SessionSettings::with_defaults()
        };
        assert_eq!(
            validate_settings(&settings),
            Err(SettingsError::ZeroDuration {
                name: "idle_timeout_ms"
            })
        );
    }

    #[test]
    fn test_validate_threshold_range_and_order() {
        let mut settings = SessionSettings::with_defaults();
        settings.vad.positive_speech_threshold = 1.5;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidThreshold(_))
        ));

        let mut settings = SessionSettings::with_defaults();
        settings.vad.negative_speech_threshold = 0.9;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn test_validate_sample_rate_and_frame_size() {
        let settings = SessionSettings {
            sample_rate: 1_000,
            ..SessionSettings::with_defaults()
        };
        assert_eq!(
            validate_settings(&settings),
            Err(SettingsError::InvalidSampleRate(1_000))
        );

        let mut settings = SessionSettings::with_defaults();
        settings.vad.frame_samples = 0;
        assert_eq!(
            validate_settings(&settings),
            Err(SettingsError::InvalidFrameSize(0))
        );
    }

    #[test]
    fn test_validate_empty_url() {
        let settings = SessionSettings {
            server_url: "  ".to_string(),
            ..SessionSettings::with_defaults()
        };
        assert_eq!(validate_settings(&settings), Err(SettingsError::EmptyServerUrl));
    }
}
