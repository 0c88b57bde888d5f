//! Wire protocol for a spoken exchange.
//!
//! Every frame on the connection is a JSON object tagged by `type`:
//!
//! ```json
//! { "type": "tts_request", "sentence": "Hello there.", "index": 0 }
//! ```
//!
//! [`ClientMessage`] covers everything the engine sends, [`ServerMessage`]
//! everything it understands from the peer. Inbound types outside this set
//! (e.g. the code-execution side channel) fail to parse and are ignored by
//! the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Outbound ───────────────────────────────────────────────────────

/// Messages sent from the engine to the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The user started talking; audio chunks follow.
    StartSpeechStream,

    /// One chunk of captured speech (base64 WAV).
    AudioChunk { audio: String },

    /// The user finished a valid utterance.
    EndSpeechStream,

    /// A complete utterance in one message (base64 WAV), used instead of the
    /// stream messages in utterance capture mode.
    UserAudio { audio: String },

    /// The user has been silent past the idle threshold.
    UserIdle,

    /// Ask the peer to synthesize one sentence.
    TtsRequest { sentence: String, index: u32 },
}

impl ClientMessage {
    /// Wire name of this message (the `type` tag).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StartSpeechStream => "start_speech_stream",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::EndSpeechStream => "end_speech_stream",
            Self::UserAudio { .. } => "user_audio",
            Self::UserIdle => "user_idle",
            Self::TtsRequest { .. } => "tts_request",
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// A finalized sentence awaiting synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsRequest {
    /// Position of this sentence within the current turn.
    pub index: u32,
    /// Sentence text, trimmed.
    pub sentence: String,
}

impl From<TtsRequest> for ClientMessage {
    fn from(req: TtsRequest) -> Self {
        Self::TtsRequest {
            sentence: req.sentence,
            index: req.index,
        }
    }
}

// ── Inbound ────────────────────────────────────────────────────────

/// Messages received from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authoritative remaining session time.
    TimerUpdate {
        remaining_seconds: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_seconds: Option<u64>,
    },

    /// The session is about to run out.
    TimerWarning { message: String },

    /// The session is over; the peer will close the connection.
    SessionComplete { message: String },

    /// Final transcription of the user's utterance.
    Transcription { user_text: String },

    /// Interim transcription while the user is still speaking.
    PartialTranscription { user_text: String },

    /// One streamed token of the assistant's reply.
    LlmToken { token: String },

    /// The assistant's reply is complete.
    LlmEnd,

    /// Synthesized audio for the sentence with the given index.
    TtsAudioChunk { index: u32, audio: String },

    /// The peer rejected something.
    Error { message: String },

    /// The in-flight generation was cancelled by the peer.
    Cancelled,
}

impl ServerMessage {
    /// Parse a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|source| ProtocolError::Decode {
            kind: peek_kind(text),
            source,
        })
    }

    /// Wire name of this message (the `type` tag).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TimerUpdate { .. } => "timer_update",
            Self::TimerWarning { .. } => "timer_warning",
            Self::SessionComplete { .. } => "session_complete",
            Self::Transcription { .. } => "transcription",
            Self::PartialTranscription { .. } => "partial_transcription",
            Self::LlmToken { .. } => "llm_token",
            Self::LlmEnd => "llm_end",
            Self::TtsAudioChunk { .. } => "tts_audio_chunk",
            Self::Error { .. } => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Best-effort extraction of the `type` tag from a frame that failed to parse,
/// so logs can name what was skipped without echoing the payload.
fn peek_kind(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("type")?.as_str().map(str::to_owned)
}

/// Protocol encoding/decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode {} message: {source}", .kind.as_deref().unwrap_or("untyped"))]
    Decode {
        /// The `type` tag, if the frame was at least a JSON object with one.
        kind: Option<String>,
        source: serde_json::Error,
    },

    #[error("Failed to encode message: {0}")]
    Encode(serde_json::Error),
}

impl ProtocolError {
    /// The `type` tag of the rejected frame, if known.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Decode { kind, .. } => kind.as_deref(),
            Self::Encode(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tts_request_wire_shape() {
        let msg = ClientMessage::TtsRequest {
            sentence: "Hello there.".to_string(),
            index: 3,
        };
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "tts_request", "sentence": "Hello there.", "index": 3 })
        );
    }

    #[test]
    fn unit_messages_carry_only_type() {
        assert_eq!(
            ClientMessage::StartSpeechStream.to_json().unwrap(),
            r#"{"type":"start_speech_stream"}"#
        );
        assert_eq!(
            ClientMessage::EndSpeechStream.to_json().unwrap(),
            r#"{"type":"end_speech_stream"}"#
        );
        assert_eq!(ClientMessage::UserIdle.to_json().unwrap(), r#"{"type":"user_idle"}"#);
    }

    #[test]
    fn audio_chunk_wire_shape() {
        let msg = ClientMessage::AudioChunk {
            audio: "UklGRg==".to_string(),
        };
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"audio_chunk","audio":"UklGRg=="}"#
        );
        assert_eq!(msg.kind(), "audio_chunk");
    }

    #[test]
    fn parses_timer_update_with_and_without_total() {
        let first = ServerMessage::parse(
            r#"{"type":"timer_update","remaining_seconds":1740,"total_seconds":1800}"#,
        )
        .unwrap();
        assert_eq!(
            first,
            ServerMessage::TimerUpdate {
                remaining_seconds: 1740,
                total_seconds: Some(1800)
            }
        );

        let tick = ServerMessage::parse(r#"{"type":"timer_update","remaining_seconds":1730}"#)
            .unwrap();
        assert_eq!(
            tick,
            ServerMessage::TimerUpdate {
                remaining_seconds: 1730,
                total_seconds: None
            }
        );
    }

    #[test]
    fn parses_audio_chunk() {
        let msg = ServerMessage::parse(
            r#"{"type":"tts_audio_chunk","audio":"data:audio/wav;base64,AAAA","index":2}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::TtsAudioChunk {
                index: 2,
                audio: "data:audio/wav;base64,AAAA".to_string()
            }
        );
    }

    #[test]
    fn parses_unit_messages() {
        assert_eq!(
            ServerMessage::parse(r#"{"type":"llm_end"}"#).unwrap(),
            ServerMessage::LlmEnd
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"cancelled"}"#).unwrap(),
            ServerMessage::Cancelled
        );
    }

    #[test]
    fn unknown_type_reports_its_tag() {
        let err = ServerMessage::parse(r#"{"type":"code_output","output":"42"}"#).unwrap_err();
        assert_eq!(err.kind(), Some("code_output"));
    }

    #[test]
    fn garbage_has_no_tag() {
        let err = ServerMessage::parse("not json").unwrap_err();
        assert!(err.kind().is_none());
        assert!(err.to_string().contains("untyped"));
    }

    #[test]
    fn tts_request_converts_to_message() {
        let msg: ClientMessage = TtsRequest {
            index: 1,
            sentence: "How are you".to_string(),
        }
        .into();
        assert_eq!(
            msg,
            ClientMessage::TtsRequest {
                sentence: "How are you".to_string(),
                index: 1
            }
        );
    }
}
