//! Conversation status: the single user-visible state of a spoken session.

use serde::{Deserialize, Serialize};

/// Current state of a conversation, owned by the session orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Opening the connection to the peer.
    #[default]
    Connecting,

    /// Waiting for the user to talk.
    Listening,

    /// The user is talking.
    UserSpeaking,

    /// Waiting for the assistant to start answering.
    Thinking,

    /// The assistant's reply is streaming in.
    Generating,

    /// Synthesized speech is playing.
    AssistantSpeaking,

    /// A transient notice (e.g. time almost up).
    Warning,

    /// The peer or a local device reported a failure.
    Error,

    /// The connection dropped; a reconnect is scheduled.
    Disconnected,

    /// The session is over.
    Complete,
}

impl ConversationStatus {
    /// Short status line for display.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Listening => "Listening...",
            Self::UserSpeaking => "Speaking...",
            Self::Thinking => "Thinking...",
            Self::Generating => "Generating response...",
            Self::AssistantSpeaking => "Assistant speaking",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Disconnected => "Disconnected. Reconnecting...",
            Self::Complete => "Session complete",
        }
    }

    /// Whether no further transitions are expected.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the status is one of the per-turn conversational states, as
    /// opposed to a connection or notice state.
    pub const fn is_conversational(self) -> bool {
        matches!(
            self,
            Self::Listening
                | Self::UserSpeaking
                | Self::Thinking
                | Self::Generating
                | Self::AssistantSpeaking
        )
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Category of a surfaced failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Microphone or speaker unavailable.
    Device,
    /// One chunk of synthesized audio could not be decoded or played.
    Playback,
    /// The peer reported an error.
    Protocol,
    /// The connection dropped or could not be opened.
    Transport,
}

impl ErrorKind {
    /// Prefix shown in front of a surfaced message.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Device => "Microphone error",
            Self::Playback => "Playback error",
            Self::Protocol => "Error",
            Self::Transport => "Connection error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_connecting() {
        assert_eq!(ConversationStatus::default(), ConversationStatus::Connecting);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ConversationStatus::AssistantSpeaking).unwrap();
        assert_eq!(json, r#""assistant_speaking""#);
    }

    #[test]
    fn only_complete_is_terminal() {
        assert!(ConversationStatus::Complete.is_terminal());
        assert!(!ConversationStatus::Disconnected.is_terminal());
        assert!(!ConversationStatus::Error.is_terminal());
    }

    #[test]
    fn notice_states_are_not_conversational() {
        assert!(ConversationStatus::Generating.is_conversational());
        assert!(!ConversationStatus::Warning.is_conversational());
        assert!(!ConversationStatus::Connecting.is_conversational());
    }

    #[test]
    fn display_uses_label() {
        assert_eq!(ConversationStatus::Listening.to_string(), "Listening...");
    }
}
