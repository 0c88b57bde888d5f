//! Captured speech → outbound protocol messages.
//!
//! In streaming mode an utterance becomes `start_speech_stream`, a series of
//! fixed-length `audio_chunk`s and `end_speech_stream`. In utterance mode the
//! whole utterance goes up as one `user_audio` once it is known to be valid.

use std::time::Duration;

use parley_core::{CaptureMode, ClientMessage, SessionSettings};

use crate::codec::encode_wav_base64;
use crate::error::VoiceError;

/// Turns VAD output for one utterance into wire messages.
#[derive(Debug)]
pub struct SpeechUplink {
    mode: CaptureMode,
    sample_rate: u32,
    chunk_samples: usize,
    min_speech: Duration,
    /// An utterance is open.
    active: bool,
    /// Streaming mode: captured samples not yet sent.
    unsent: Vec<f32>,
}

impl SpeechUplink {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            mode: settings.capture_mode,
            sample_rate: settings.sample_rate,
            chunk_samples: settings.stream_chunk_samples().max(1),
            min_speech: Duration::from_millis(settings.min_speech_duration_ms),
            active: false,
            unsent: Vec::new(),
        }
    }

    pub const fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Open an utterance with its pre-roll audio.
    pub fn begin(&mut self, preroll: &[f32]) -> Result<Vec<ClientMessage>, VoiceError> {
        self.unsent.clear();
        self.active = true;
        match self.mode {
            CaptureMode::Streaming => {
                let mut out = vec![ClientMessage::StartSpeechStream];
                out.extend(self.push(preroll)?);
                Ok(out)
            }
            CaptureMode::Utterance => Ok(Vec::new()),
        }
    }

    /// Add captured samples; returns any chunks that filled up.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<ClientMessage>, VoiceError> {
        if !self.active || self.mode != CaptureMode::Streaming {
            return Ok(Vec::new());
        }
        self.unsent.extend_from_slice(samples);

        let mut out = Vec::new();
        while self.unsent.len() >= self.chunk_samples {
            let chunk: Vec<f32> = self.unsent.drain(..self.chunk_samples).collect();
            out.push(ClientMessage::AudioChunk {
                audio: encode_wav_base64(&chunk, self.sample_rate)?,
            });
        }
        Ok(out)
    }

    /// Close the utterance. `audio` is the complete utterance.
    ///
    /// Returns `None` when it is too short to count as a turn; nothing more
    /// is sent in that case.
    pub fn finish(&mut self, audio: &[f32]) -> Result<Option<Vec<ClientMessage>>, VoiceError> {
        let was_active = std::mem::replace(&mut self.active, false);
        let unsent = std::mem::take(&mut self.unsent);

        if !was_active || !self.is_long_enough(audio.len()) {
            return Ok(None);
        }

        let messages = match self.mode {
            CaptureMode::Streaming => {
                let mut out = Vec::with_capacity(2);
                if !unsent.is_empty() {
                    out.push(ClientMessage::AudioChunk {
                        audio: encode_wav_base64(&unsent, self.sample_rate)?,
                    });
                }
                out.push(ClientMessage::EndSpeechStream);
                out
            }
            CaptureMode::Utterance => vec![ClientMessage::UserAudio {
                audio: encode_wav_base64(audio, self.sample_rate)?,
            }],
        };
        Ok(Some(messages))
    }

    /// Drop the open utterance without sending anything else.
    pub fn abort(&mut self) {
        self.active = false;
        self.unsent.clear();
    }

    /// Length of `samples` at the session rate.
    pub fn duration_of(&self, samples: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(samples as u64 * 1_000_000 / u64::from(self.sample_rate))
    }

    fn is_long_enough(&self, samples: usize) -> bool {
        self.duration_of(samples) >= self.min_speech
    }
}
