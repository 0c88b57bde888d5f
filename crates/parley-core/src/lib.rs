//! Core domain types for parley.
//!
//! Everything here is pure: the wire protocol, the conversation status shown
//! to the user, session settings and the endpoint a session connects to.
//! Audio, timing and transport live in `parley-voice`.

#![deny(unused_crate_dependencies)]

pub mod endpoint;
pub mod protocol;
pub mod settings;
pub mod status;

pub use endpoint::{Credential, EndpointError, SessionEndpoint};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage, TtsRequest};
pub use settings::{
    CaptureMode, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MIN_SPEECH_DURATION_MS,
    DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_SAMPLE_RATE, DEFAULT_STREAM_CHUNK_MS,
    DEFAULT_WARNING_DISPLAY_MS, SessionSettings, SettingsError, VadSettings, validate_settings,
};
pub use status::{ConversationStatus, ErrorKind};
