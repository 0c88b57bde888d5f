//! `AudioSource` and `AudioSink` abstractions for the session's audio I/O.
//!
//! These traits decouple the [`ConversationSession`](crate::session::ConversationSession)
//! from any specific audio backend:
//!
//! | Implementor | Where used |
//! |---|---|
//! | `LocalMicrophone` / `LocalSpeaker` | CLI with the `local-audio` feature (cpal capture, rodio playback) |
//! | [`WavFileSource`] / [`NullSink`] | Headless runs and scripted demos |
//!
//! Both traits are object-safe (`Box<dyn AudioSource>` / `Box<dyn AudioSink>`).
//! Neither requires `Send`: the session runs on a single-threaded event loop
//! and device handles such as `cpal::Stream` are not `Send`.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::codec::{AudioClip, read_clip};
use crate::error::VoiceError;
use crate::resample::{downmix_to_mono, resample_all};

// ── AudioSource ────────────────────────────────────────────────────

/// Abstraction over an audio input (microphone capture).
///
/// Samples are mono f32 at the session sample rate; block size is up to the
/// implementation.
pub trait AudioSource {
    /// Acquire the device and start pushing sample blocks into `frames`.
    fn open(&mut self, frames: UnboundedSender<Vec<f32>>) -> Result<(), VoiceError>;

    /// Release the device. Must be safe to call when not open.
    fn close(&mut self);
}

// ── AudioSink ──────────────────────────────────────────────────────

/// Abstraction over an audio output (assistant speech).
///
/// The playback engine owns the clock, so a sink only needs to start a clip
/// at an offset and stop it.
pub trait AudioSink {
    /// Start playing `clip` from `offset`, replacing anything already playing.
    fn start(&mut self, clip: &AudioClip, offset: Duration) -> Result<(), VoiceError>;

    /// Stop playback and release the output. Idempotent.
    fn stop(&mut self);
}

// ── WavFileSource ──────────────────────────────────────────────────

/// Length of each block pushed by [`WavFileSource`].
const WAV_BLOCK_MS: u64 = 20;

/// Trailing silence appended after the file so a final utterance can end.
const WAV_TAIL_SILENCE_MS: u64 = 1_000;

/// Streams a WAV file into the session in real time, as if spoken into a
/// microphone. Decoded and resampled up front.
pub struct WavFileSource {
    samples: Vec<f32>,
    sample_rate: u32,
    cancel: Option<CancellationToken>,
}

impl WavFileSource {
    /// Load `path` and convert it to mono at `sample_rate`.
    pub fn open_file(path: &Path, sample_rate: u32) -> Result<Self, VoiceError> {
        let reader = hound::WavReader::open(path)?;
        let clip = read_clip(reader)?;
        let mono = downmix_to_mono(&clip.samples, clip.channels);
        let samples = resample_all(&mono, clip.sample_rate, sample_rate)?;

        tracing::info!(
            path = %path.display(),
            samples = samples.len(),
            sample_rate,
            "Loaded WAV input"
        );

        Ok(Self::from_samples(samples, sample_rate))
    }

    /// Stream already-prepared mono samples at `sample_rate`.
    pub const fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            cancel: None,
        }
    }

    const fn block_len(&self) -> usize {
        (self.sample_rate as u64 * WAV_BLOCK_MS / 1000) as usize
    }
}

impl AudioSource for WavFileSource {
    fn open(&mut self, frames: UnboundedSender<Vec<f32>>) -> Result<(), VoiceError> {
        if self.cancel.is_some() {
            return Err(VoiceError::AlreadyActive);
        }

        let block = self.block_len().max(1);
        let tail = usize::try_from(u64::from(self.sample_rate) * WAV_TAIL_SILENCE_MS / 1000)
            .unwrap_or(0);
        let mut audio = self.samples.clone();
        audio.resize(audio.len() + tail, 0.0);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(WAV_BLOCK_MS));
            for chunk in audio.chunks(block) {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if frames.send(chunk.to_vec()).is_err() {
                    return;
                }
            }
            tracing::debug!("WAV input exhausted");
        });

        self.cancel = Some(cancel);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl Drop for WavFileSource {
    fn drop(&mut self) {
        self.close();
    }
}

// ── NullSink ───────────────────────────────────────────────────────

/// Discards audio. Used when no output device is wanted.
#[derive(Debug, Default)]
pub struct NullSink {
    playing: bool,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullSink {
    fn start(&mut self, clip: &AudioClip, offset: Duration) -> Result<(), VoiceError> {
        tracing::debug!(
            duration_ms = clip.duration().as_millis(),
            offset_ms = offset.as_millis(),
            "Null sink: discarding clip"
        );
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.playing = false;
    }
}
