//! Real-time voice turn-taking for parley.
//!
//! A [`ConversationSession`] listens to the microphone through a
//! [`VoiceActivityGate`], streams the user's speech to a remote peer over a
//! [`WsTransport`], splits the streamed reply into sentences, requests audio
//! for each one and plays the results back in order. When the user talks
//! over the assistant, playback stops at the current position and resumes
//! there if the interruption turns out to be too short to count as a turn.
#![deny(unused_crate_dependencies)]

// dev-dependency used only by integration tests
#[cfg(test)]
use tokio_test as _;

pub mod audio_io;
pub mod codec;
pub mod error;
pub mod playback;
pub mod reassembly;
pub mod resample;
pub mod segment;
pub mod session;
pub mod timers;
pub mod transport;
pub mod uplink;
pub mod vad;

#[cfg(feature = "local-audio")]
pub mod capture;
#[cfg(feature = "local-audio")]
pub mod output;

// Re-export key types for convenience
pub use audio_io::{AudioSink, AudioSource, NullSink, WavFileSource};
#[cfg(feature = "local-audio")]
pub use capture::LocalMicrophone;
pub use codec::{AudioClip, decode_wav_base64, encode_wav_base64};
pub use error::VoiceError;
#[cfg(feature = "local-audio")]
pub use output::LocalSpeaker;
pub use playback::{InterruptedPlayback, PlaybackEngine};
pub use reassembly::{AudioChunk, ChunkReassembler, ChunkRejection};
pub use segment::SentenceSegmenter;
pub use session::{ConversationSession, SessionEvent, SessionOutcome};
pub use timers::{CountdownTimer, IdleTimer};
pub use transport::{ReconnectPolicy, TransportEvent, TransportHandle, WsTransport};
pub use uplink::SpeechUplink;
#[cfg(feature = "silero")]
pub use vad::SileroClassifier;
pub use vad::{
    EnergyClassifier, SpeechClassifier, VadEvent, VoiceActivityDetector, VoiceActivityGate,
};
