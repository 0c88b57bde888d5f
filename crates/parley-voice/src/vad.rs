//! Voice Activity Detection: turns raw microphone audio into turn edges.
//!
//! [`VoiceActivityDetector`] classifies fixed-size frames and tracks
//! utterance boundaries with hysteresis (separate start/continue thresholds
//! plus a redemption window). [`VoiceActivityGate`] owns the microphone,
//! re-frames whatever block sizes the device delivers and reports what the
//! session needs to know, in order.
//!
//! Frames are scored by a [`SpeechClassifier`]:
//!
//! * **Silero** (`silero` feature) - neural detection via
//!   `sherpa_rs::silero_vad::SileroVad`, loaded from an ONNX model file.
//! * **Energy** - RMS energy mapped onto 0..1. Always available.

use std::collections::VecDeque;
#[cfg(feature = "silero")]
use std::path::Path;

use parley_core::VadSettings;
#[cfg(feature = "silero")]
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use tokio::sync::mpsc::UnboundedSender;

use crate::audio_io::AudioSource;
use crate::error::VoiceError;

// ── Classifier ─────────────────────────────────────────────────────

/// Per-frame speech probability.
///
/// Implement this to plug in a neural detector; [`EnergyClassifier`] is the
/// always-available default.
pub trait SpeechClassifier {
    /// Probability (0.0..=1.0) that `frame` contains speech.
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32, VoiceError>;

    /// Clear any internal state between utterances.
    fn reset(&mut self) {}
}

/// RMS energy mapped linearly onto 0..1.
///
/// Frames at or below `floor` score 0.0, at or above `ceiling` score 1.0.
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    floor: f32,
    ceiling: f32,
}

impl EnergyClassifier {
    pub const fn new(floor: f32, ceiling: f32) -> Self {
        Self { floor, ceiling }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        // Quiet room noise sits well under 0.001 RMS; close-mic speech
        // easily clears 0.05.
        Self::new(0.001, 0.05)
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32, VoiceError> {
        let energy = calculate_rms_energy(frame);
        let span = (self.ceiling - self.floor).max(f32::EPSILON);
        Ok(((energy - self.floor) / span).clamp(0.0, 1.0))
    }
}

/// Silero VAD through sherpa-onnx.
///
/// The binding reports Silero's speech decision rather than the raw
/// probability, so frames score 1.0 inside speech and 0.0 outside. Silero's
/// own minimum durations are one frame; the detector's redemption window
/// decides when an utterance ends.
#[cfg(feature = "silero")]
pub struct SileroClassifier {
    vad: SileroVad,
}

#[cfg(feature = "silero")]
impl SileroClassifier {
    /// Load the Silero ONNX model (e.g. `silero_vad.onnx`).
    pub fn load(model_path: &Path, config: &VadSettings, sample_rate: u32) -> Result<Self, VoiceError> {
        if !model_path.exists() {
            return Err(VoiceError::ModelNotFound(model_path.to_path_buf()));
        }
        let model = model_path
            .to_str()
            .ok_or_else(|| VoiceError::ModelNotFound(model_path.to_path_buf()))?;

        #[allow(clippy::cast_precision_loss)]
        let frame_secs = config.frame_samples as f32 / sample_rate as f32;
        #[allow(clippy::cast_possible_wrap)]
        let window_size = config.frame_samples as i32;

        let silero_config = SileroVadConfig {
            model: model.to_string(),
            threshold: config.positive_speech_threshold,
            min_silence_duration: frame_secs,
            min_speech_duration: frame_secs,
            sample_rate,
            window_size,
            ..SileroVadConfig::default()
        };

        // Segments are discarded every frame; a short buffer is enough.
        let vad = SileroVad::new(silero_config, 30.0)
            .map_err(|e| VoiceError::ModelLoadError(format!("Failed to load Silero VAD: {e}")))?;

        tracing::info!(path = %model_path.display(), "Silero VAD model loaded");
        Ok(Self { vad })
    }
}

#[cfg(feature = "silero")]
impl SpeechClassifier for SileroClassifier {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32, VoiceError> {
        self.vad.accept_waveform(frame.to_vec());
        let speech = self.vad.is_speech();

        // The detector keeps its own copy of the utterance.
        while !self.vad.is_empty() {
            self.vad.pop();
        }

        Ok(if speech { 1.0 } else { 0.0 })
    }

    fn reset(&mut self) {
        self.vad.clear();
    }
}

/// Calculate RMS (Root Mean Square) energy of an audio frame.
pub fn calculate_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();

    #[allow(clippy::cast_precision_loss)]
    let mean = sum_squares / samples.len() as f32;

    mean.sqrt()
}

// ── Detector ───────────────────────────────────────────────────────

/// Edge events raised by the detector.
#[derive(Debug, Clone, PartialEq)]
pub enum VadEvent {
    /// Speech has started. Carries the padded pre-roll, including the frame
    /// that triggered the start.
    SpeechStart { preroll: Vec<f32> },

    /// Speech has ended. `audio` is the complete utterance including pre-roll.
    /// A `misfire` had too few positive frames to count as speech.
    SpeechEnd { audio: Vec<f32>, misfire: bool },

    /// Detection stopped; the microphone is no longer being listened to.
    VadIdle,
}

/// Current detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Waiting for speech to start.
    Listening,

    /// Inside an utterance.
    Speaking,
}

/// Frame-level speech detector with hysteresis.
pub struct VoiceActivityDetector {
    config: VadSettings,
    classifier: Box<dyn SpeechClassifier>,
    state: VadState,

    /// Recent frames kept while listening, for pre-roll.
    preroll: VecDeque<Vec<f32>>,

    /// Audio of the current utterance (pre-roll + speech).
    utterance: Vec<f32>,

    /// Consecutive frames below the negative threshold.
    redemption_count: u32,

    /// Positive frames seen in the current utterance.
    speech_frame_count: u32,
}

impl VoiceActivityDetector {
    pub fn new(config: VadSettings, classifier: Box<dyn SpeechClassifier>) -> Self {
        Self {
            config,
            classifier,
            state: VadState::Listening,
            preroll: VecDeque::new(),
            utterance: Vec::new(),
            redemption_count: 0,
            speech_frame_count: 0,
        }
    }

    /// Classify one frame and return the edge it caused, if any.
    pub fn process_frame(&mut self, frame: &[f32]) -> Option<VadEvent> {
        let probability = match self.classifier.speech_probability(frame) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Speech classifier failed, treating frame as silence");
                0.0
            }
        };
        let positive = probability >= self.config.positive_speech_threshold;
        let negative = probability < self.config.negative_speech_threshold;

        match self.state {
            VadState::Listening => {
                self.preroll.push_back(frame.to_vec());
                if positive {
                    self.state = VadState::Speaking;
                    self.redemption_count = 0;
                    self.speech_frame_count = 1;
                    let preroll: Vec<f32> = self.preroll.drain(..).flatten().collect();
                    self.utterance.clone_from(&preroll);
                    tracing::debug!(probability, preroll = preroll.len(), "VAD: speech started");
                    return Some(VadEvent::SpeechStart { preroll });
                }
                let keep = self.config.pre_speech_pad_frames as usize;
                while self.preroll.len() > keep {
                    self.preroll.pop_front();
                }
            }

            VadState::Speaking => {
                self.utterance.extend_from_slice(frame);
                if positive {
                    self.redemption_count = 0;
                    self.speech_frame_count += 1;
                } else if negative {
                    self.redemption_count += 1;
                    if self.redemption_count >= self.config.redemption_frames {
                        return Some(self.finish_utterance());
                    }
                }
            }
        }

        None
    }

    fn finish_utterance(&mut self) -> VadEvent {
        let audio = std::mem::take(&mut self.utterance);
        let misfire = self.speech_frame_count < self.config.min_speech_frames;
        tracing::debug!(
            samples = audio.len(),
            speech_frames = self.speech_frame_count,
            misfire,
            "VAD: speech ended"
        );
        self.reset();
        VadEvent::SpeechEnd { audio, misfire }
    }

    /// Back to listening with empty buffers; any open utterance is dropped.
    pub fn reset(&mut self) {
        self.state = VadState::Listening;
        self.preroll.clear();
        self.utterance.clear();
        self.redemption_count = 0;
        self.speech_frame_count = 0;
        self.classifier.reset();
    }

    #[must_use]
    pub const fn state(&self) -> VadState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == VadState::Speaking
    }

    pub const fn frame_samples(&self) -> usize {
        self.config.frame_samples as usize
    }
}

// ── Gate ───────────────────────────────────────────────────────────

/// What the gate reports for a block of microphone audio.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutput {
    /// A turn edge.
    Event(VadEvent),

    /// A frame captured inside an utterance, after its `SpeechStart`.
    Speech(Vec<f32>),
}

/// Owns the microphone and the detector.
///
/// `start`/`stop` are idempotent. Stopping always releases the device and
/// raises [`VadEvent::VadIdle`] if the gate was running.
pub struct VoiceActivityGate {
    source: Box<dyn AudioSource>,
    detector: VoiceActivityDetector,
    pending: Vec<f32>,
    active: bool,
}

impl VoiceActivityGate {
    pub fn new(source: Box<dyn AudioSource>, detector: VoiceActivityDetector) -> Self {
        Self {
            source,
            detector,
            pending: Vec::new(),
            active: false,
        }
    }

    /// Gate with the default energy classifier.
    pub fn with_energy_detector(source: Box<dyn AudioSource>, config: VadSettings) -> Self {
        Self::with_classifier(source, config, Box::new(EnergyClassifier::default()))
    }

    pub fn with_classifier(
        source: Box<dyn AudioSource>,
        config: VadSettings,
        classifier: Box<dyn SpeechClassifier>,
    ) -> Self {
        Self::new(source, VoiceActivityDetector::new(config, classifier))
    }

    /// Acquire the microphone. No-op if already running.
    pub fn start(&mut self, frames: UnboundedSender<Vec<f32>>) -> Result<(), VoiceError> {
        if self.active {
            return Ok(());
        }
        self.detector.reset();
        self.pending.clear();
        self.source.open(frames)?;
        self.active = true;
        tracing::info!("Voice activity gate started");
        Ok(())
    }

    /// Release the microphone. Returns `VadIdle` if the gate was running.
    pub fn stop(&mut self) -> Option<VadEvent> {
        if !self.active {
            return None;
        }
        self.source.close();
        self.active = false;
        self.detector.reset();
        self.pending.clear();
        tracing::info!("Voice activity gate stopped");
        Some(VadEvent::VadIdle)
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_speaking(&self) -> bool {
        self.detector.is_speaking()
    }

    /// Feed a block of samples. Ignored while stopped.
    pub fn push(&mut self, samples: &[f32]) -> Vec<GateOutput> {
        let mut out = Vec::new();
        if !self.active {
            return out;
        }

        self.pending.extend_from_slice(samples);
        let frame_len = self.detector.frame_samples().max(1);
        let mut consumed = 0;

        while self.pending.len() - consumed >= frame_len {
            let frame = &self.pending[consumed..consumed + frame_len];
            let was_speaking = self.detector.is_speaking();
            match self.detector.process_frame(frame) {
                Some(event @ VadEvent::SpeechStart { .. }) => out.push(GateOutput::Event(event)),
                Some(event) => {
                    if was_speaking {
                        out.push(GateOutput::Speech(frame.to_vec()));
                    }
                    out.push(GateOutput::Event(event));
                }
                None if was_speaking => out.push(GateOutput::Speech(frame.to_vec())),
                None => {}
            }
            consumed += frame_len;
        }

        self.pending.drain(..consumed);
        out
    }
}

impl Drop for VoiceActivityGate {
    fn drop(&mut self) {
        if self.active {
            self.source.close();
        }
    }
}
