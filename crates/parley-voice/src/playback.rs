//! Playback engine: ordered, interruptible, resumable assistant speech.
//!
//! The engine owns the playback clock. An [`AudioSink`] only starts a clip at
//! an offset and stops it; natural completion is a deadline the session's
//! event loop sleeps until, and an interruption's offset is computed from the
//! same clock.

use std::time::Duration;

use tokio::time::Instant;

use crate::audio_io::AudioSink;
use crate::codec::{AudioClip, decode_wav_base64};
use crate::reassembly::ChunkReassembler;

/// Where an interrupted clip left off.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptedPlayback {
    pub clip: AudioClip,
    pub offset: Duration,
}

#[derive(Debug)]
struct ActiveClip {
    clip: AudioClip,
    started_at: Instant,
    start_offset: Duration,
}

impl ActiveClip {
    fn position(&self, now: Instant) -> Duration {
        self.start_offset + now.saturating_duration_since(self.started_at)
    }

    fn deadline(&self) -> Instant {
        self.started_at + self.clip.duration().saturating_sub(self.start_offset)
    }
}

/// Result of asking the engine to play the next item.
#[derive(Debug, Default)]
pub struct PlayOutcome {
    /// Something is now playing.
    pub started: bool,
    /// It was an interrupted clip picking up where it stopped.
    pub resumed: bool,
    /// Chunks skipped because they failed to decode or start.
    pub failures: Vec<String>,
}

/// Plays chunks from a [`ChunkReassembler`] through an [`AudioSink`].
pub struct PlaybackEngine {
    sink: Box<dyn AudioSink>,
    active: Option<ActiveClip>,
    mark: Option<InterruptedPlayback>,
}

impl PlaybackEngine {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            active: None,
            mark: None,
        }
    }

    /// Start the next item if idle: the interrupted clip first, otherwise the
    /// head of the play queue. Items that fail are skipped.
    pub fn play_next(&mut self, queue: &mut ChunkReassembler, now: Instant) -> PlayOutcome {
        let mut outcome = PlayOutcome::default();
        if self.active.is_some() {
            return outcome;
        }

        if let Some(mark) = self.mark.take() {
            match self.sink.start(&mark.clip, mark.offset) {
                Ok(()) => {
                    tracing::debug!(
                        offset_ms = mark.offset.as_millis(),
                        "Resuming interrupted playback"
                    );
                    self.active = Some(ActiveClip {
                        clip: mark.clip,
                        started_at: now,
                        start_offset: mark.offset,
                    });
                    outcome.started = true;
                    outcome.resumed = true;
                    return outcome;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to resume interrupted playback, skipping");
                    outcome.failures.push(e.to_string());
                }
            }
        }

        while let Some(chunk) = queue.pop() {
            let clip = match decode_wav_base64(&chunk.payload) {
                Ok(clip) => clip,
                Err(e) => {
                    tracing::warn!(index = chunk.index, error = %e, "Skipping undecodable audio chunk");
                    outcome.failures.push(e.to_string());
                    continue;
                }
            };

            if let Err(e) = self.sink.start(&clip, Duration::ZERO) {
                tracing::warn!(index = chunk.index, error = %e, "Failed to start playback, skipping chunk");
                outcome.failures.push(e.to_string());
                continue;
            }

            tracing::debug!(
                index = chunk.index,
                duration_ms = clip.duration().as_millis(),
                "Playing audio chunk"
            );
            self.active = Some(ActiveClip {
                clip,
                started_at: now,
                start_offset: Duration::ZERO,
            });
            outcome.started = true;
            return outcome;
        }

        outcome
    }

    /// When the current clip will finish on its own.
    pub fn completion_deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(ActiveClip::deadline)
    }

    /// Mark the current clip finished if its deadline has passed.
    pub fn finish(&mut self, now: Instant) -> bool {
        match self.completion_deadline() {
            Some(deadline) if now >= deadline => {
                self.active = None;
                self.sink.stop();
                true
            }
            _ => false,
        }
    }

    /// Cut playback short. Records a resume mark when stopped strictly inside
    /// the clip. Always releases the output.
    pub fn interrupt(&mut self, now: Instant) -> Option<Duration> {
        let recorded = self.active.take().and_then(|active| {
            let offset = active.position(now);
            if offset > Duration::ZERO && offset < active.clip.duration() {
                tracing::debug!(offset_ms = offset.as_millis(), "Playback interrupted mid-clip");
                self.mark = Some(InterruptedPlayback {
                    clip: active.clip,
                    offset,
                });
                Some(offset)
            } else {
                None
            }
        });
        self.sink.stop();
        recorded
    }

    /// Forget the interrupted clip.
    pub fn discard_mark(&mut self) {
        if self.mark.take().is_some() {
            tracing::debug!("Discarded interrupted playback");
        }
    }

    /// Stop everything and forget the mark.
    pub fn halt(&mut self) {
        self.active = None;
        self.mark = None;
        self.sink.stop();
    }

    pub const fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub const fn mark(&self) -> Option<&InterruptedPlayback> {
        self.mark.as_ref()
    }

    pub const fn has_mark(&self) -> bool {
        self.mark.is_some()
    }
}
