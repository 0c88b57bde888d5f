//! Session orchestrator: one spoken conversation over one connection.
//!
//! ```text
//!   Connecting → Listening ⇄ UserSpeaking → Thinking → Generating → AssistantSpeaking
//!        ▲          ▲                                                    │
//!        │          └────────────────────────────────────────────────────┘
//!   Disconnected (reconnect)                           Complete (terminal)
//! ```
//!
//! Every handler is synchronous and takes `now`, so the state machine can be
//! driven step by step. [`ConversationSession::run`] is the event loop that
//! feeds it from the transport, the microphone and its own deadlines.

use std::time::Duration;

use parley_core::{
    ClientMessage, ConversationStatus, ErrorKind, ServerMessage, SessionSettings,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::audio_io::{AudioSink, AudioSource};
use crate::playback::PlaybackEngine;
use crate::reassembly::{AudioChunk, ChunkReassembler};
use crate::segment::SentenceSegmenter;
use crate::timers::{CountdownTimer, IdleTimer};
use crate::transport::{TransportEvent, TransportHandle};
use crate::uplink::SpeechUplink;
use crate::vad::{GateOutput, SpeechClassifier, VadEvent, VoiceActivityGate};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the session to the UI / application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Conversation status changed.
    StatusChanged(ConversationStatus),

    /// Transcription of the user's speech.
    UserTranscript {
        text: String,
        /// Whether this is a partial (streaming) or final result.
        is_final: bool,
    },

    /// One streamed token of the assistant's reply.
    AssistantToken(String),

    /// Assistant audio started (`true`) or stopped (`false`).
    AssistantSpeaking(bool),

    /// Remaining session time in seconds, when known.
    RemainingTime(Option<u64>),

    /// A message to show the user (time warnings, completion).
    Notice(String),

    /// A failure worth surfacing.
    Error { kind: ErrorKind, message: String },
}

/// How a session run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub status: ConversationStatus,
    pub remaining_seconds: Option<u64>,
}

impl SessionOutcome {
    /// The peer ended the session normally.
    pub const fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A timer warning on screen and the status it covers.
#[derive(Debug, Clone, Copy)]
struct WarningOverlay {
    restore: ConversationStatus,
    until: Instant,
}

// ── Session ────────────────────────────────────────────────────────

/// The conversation state machine.
pub struct ConversationSession {
    status: ConversationStatus,
    transport: TransportHandle,

    gate: VoiceActivityGate,
    uplink: SpeechUplink,
    segmenter: SentenceSegmenter,
    reassembler: ChunkReassembler,
    playback: PlaybackEngine,

    idle: IdleTimer,
    countdown: CountdownTimer,
    warning: Option<WarningOverlay>,
    warning_display: Duration,

    /// The user holds the floor (between speech start and end).
    user_speaking: bool,

    /// A turn or nudge was sent and the reply has not finished.
    awaiting_response: bool,

    connected: bool,

    /// Set once the run should stop (transport finished or closed after
    /// completion).
    finished: bool,

    frames_tx: mpsc::UnboundedSender<Vec<f32>>,
    frames_rx: Option<mpsc::UnboundedReceiver<Vec<f32>>>,

    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ConversationSession {
    /// Create a session around an already-built gate and playback engine.
    ///
    /// Returns the session and a receiver for [`SessionEvent`]s.
    #[must_use]
    pub fn new(
        settings: &SessionSettings,
        transport: TransportHandle,
        gate: VoiceActivityGate,
        playback: PlaybackEngine,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let session = Self {
            status: ConversationStatus::Connecting,
            transport,
            gate,
            uplink: SpeechUplink::new(settings),
            segmenter: SentenceSegmenter::new(),
            reassembler: ChunkReassembler::new(),
            playback,
            idle: IdleTimer::new(Duration::from_millis(settings.idle_timeout_ms)),
            countdown: CountdownTimer::new(),
            warning: None,
            warning_display: Duration::from_millis(settings.warning_display_ms),
            user_speaking: false,
            awaiting_response: false,
            connected: false,
            finished: false,
            frames_tx,
            frames_rx: Some(frames_rx),
            event_tx,
        };

        (session, event_rx)
    }

    /// Create a session that scores microphone frames with `classifier`.
    #[must_use]
    pub fn with_classifier(
        settings: &SessionSettings,
        transport: TransportHandle,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        classifier: Box<dyn SpeechClassifier>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let gate = VoiceActivityGate::with_classifier(source, settings.vad.clone(), classifier);
        Self::new(settings, transport, gate, PlaybackEngine::new(sink))
    }

    // ── Accessors ──────────────────────────────────────────────────

    #[must_use]
    pub const fn status(&self) -> ConversationStatus {
        self.status
    }

    pub const fn is_user_speaking(&self) -> bool {
        self.user_speaking
    }

    pub const fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    pub const fn idle_timer(&self) -> &IdleTimer {
        &self.idle
    }

    pub const fn countdown(&self) -> &CountdownTimer {
        &self.countdown
    }

    pub const fn segmenter(&self) -> &SentenceSegmenter {
        &self.segmenter
    }

    pub const fn reassembler(&self) -> &ChunkReassembler {
        &self.reassembler
    }

    pub const fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub const fn gate(&self) -> &VoiceActivityGate {
        &self.gate
    }

    // ── Transport ──────────────────────────────────────────────────

    /// React to the connection opening, dropping or delivering a message.
    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Opened => self.on_connected(now),
            TransportEvent::Message(message) => self.handle_server_message(message, now),
            TransportEvent::Closed { reason } => self.on_disconnected(&reason),
            TransportEvent::Finished => {
                self.finished = true;
                if !self.status.is_terminal() {
                    self.on_disconnected("transport stopped");
                }
            }
        }
    }

    fn on_connected(&mut self, now: Instant) {
        self.connected = true;
        tracing::info!("Session connected");
        self.set_state(ConversationStatus::Listening);

        if let Err(e) = self.gate.start(self.frames_tx.clone()) {
            tracing::error!(error = %e, "Failed to start microphone");
            self.set_state(ConversationStatus::Error);
            self.emit(SessionEvent::Error {
                kind: ErrorKind::Device,
                message: e.to_string(),
            });
        }
        self.idle.arm(now);
    }

    fn on_disconnected(&mut self, reason: &str) {
        if self.status.is_terminal() {
            tracing::debug!(%reason, "Connection closed after completion");
            self.connected = false;
            self.finished = true;
            return;
        }

        let was_connected = std::mem::replace(&mut self.connected, false);
        if self.gate.stop().is_some() {
            tracing::debug!("Microphone released on disconnect");
        }
        self.idle.clear();
        self.countdown.freeze();
        if self.playback.is_playing() {
            self.emit(SessionEvent::AssistantSpeaking(false));
        }
        self.playback.halt();
        self.reassembler.reset();
        self.segmenter.reset();
        self.uplink.abort();
        self.user_speaking = false;
        self.awaiting_response = false;

        self.set_state(ConversationStatus::Disconnected);
        if was_connected || self.finished {
            self.emit(SessionEvent::Error {
                kind: ErrorKind::Transport,
                message: reason.to_string(),
            });
        }
    }

    fn handle_server_message(&mut self, message: ServerMessage, now: Instant) {
        tracing::debug!(kind = message.kind(), "Inbound message");
        match message {
            ServerMessage::TimerUpdate {
                remaining_seconds,
                total_seconds,
            } => {
                if let Some(total) = total_seconds {
                    tracing::debug!(total, "Session length");
                }
                if self.status.is_terminal() {
                    return;
                }
                self.countdown.set_remaining(remaining_seconds, now);
                self.emit(SessionEvent::RemainingTime(Some(remaining_seconds)));
            }

            ServerMessage::TimerWarning { message } => {
                let restore = self.warning.map_or(self.status, |w| w.restore);
                self.warning = Some(WarningOverlay {
                    restore,
                    until: now + self.warning_display,
                });
                self.set_state(ConversationStatus::Warning);
                self.emit(SessionEvent::Notice(message));
            }

            ServerMessage::SessionComplete { message } => {
                let _ = self.gate.stop();
                self.idle.clear();
                self.countdown.freeze();
                if self.playback.is_playing() {
                    self.emit(SessionEvent::AssistantSpeaking(false));
                }
                self.playback.halt();
                self.uplink.abort();
                self.user_speaking = false;
                self.awaiting_response = false;
                self.transport.shutdown();

                self.set_state(ConversationStatus::Complete);
                self.emit(SessionEvent::Notice(message));
                self.emit(SessionEvent::RemainingTime(self.countdown.remaining()));
            }

            ServerMessage::Transcription { user_text } => {
                self.emit(SessionEvent::UserTranscript {
                    text: user_text,
                    is_final: true,
                });
            }

            ServerMessage::PartialTranscription { user_text } => {
                self.emit(SessionEvent::UserTranscript {
                    text: user_text,
                    is_final: false,
                });
            }

            ServerMessage::LlmToken { token } => self.on_token(token),

            ServerMessage::LlmEnd => {
                if self.user_speaking {
                    return;
                }
                if let Some(request) = self.segmenter.flush() {
                    self.send_tts_request(request);
                }
                self.awaiting_response = false;
                self.drain_and_signal(now);
            }

            ServerMessage::TtsAudioChunk { index, audio } => {
                let chunk = AudioChunk {
                    index,
                    payload: audio,
                };
                if self.reassembler.receive(chunk).is_ok() {
                    self.drain_and_signal(now);
                }
            }

            ServerMessage::Error { message } => {
                tracing::warn!(%message, "Peer reported an error");
                self.idle.clear();
                self.awaiting_response = false;
                self.set_state(ConversationStatus::Error);
                self.emit(SessionEvent::Error {
                    kind: ErrorKind::Protocol,
                    message,
                });
            }

            ServerMessage::Cancelled => {
                self.segmenter.clear_buffer();
                self.awaiting_response = false;
                // The peer cancels when a new speech stream starts; the
                // user keeps the floor in that case.
                if !self.user_speaking && !self.playback.is_playing() {
                    self.set_state(ConversationStatus::Listening);
                    self.idle.arm(now);
                }
            }
        }
    }

    fn on_token(&mut self, token: String) {
        if self.user_speaking || self.status.is_terminal() {
            tracing::debug!("Ignoring token from a superseded turn");
            return;
        }

        self.idle.clear();
        if !self.playback.is_playing() {
            self.set_state(ConversationStatus::Generating);
        }

        for request in self.segmenter.feed(&token) {
            self.send_tts_request(request);
        }
        self.emit(SessionEvent::AssistantToken(token));
    }

    fn send_tts_request(&mut self, request: parley_core::TtsRequest) {
        tracing::debug!(index = request.index, "Requesting synthesis");
        self.reassembler.register_request(request.index);
        self.transport.send(request.into());
    }

    // ── Microphone ─────────────────────────────────────────────────

    /// Feed a block of microphone samples through the gate.
    pub fn handle_audio_frames(&mut self, samples: &[f32], now: Instant) {
        for output in self.gate.push(samples) {
            match output {
                GateOutput::Event(event) => self.handle_vad_event(event, now),
                GateOutput::Speech(frame) => match self.uplink.push(&frame) {
                    Ok(messages) => self.send_all(messages),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode speech chunk"),
                },
            }
        }
    }

    /// React to a voice-activity edge.
    pub fn handle_vad_event(&mut self, event: VadEvent, now: Instant) {
        match event {
            VadEvent::SpeechStart { preroll } => self.on_speech_start(&preroll, now),
            VadEvent::SpeechEnd { audio, misfire } => self.on_speech_end(&audio, misfire, now),
            VadEvent::VadIdle => {
                if self.status.is_conversational()
                    && !self.user_speaking
                    && !self.playback.is_playing()
                    && !self.reply_outstanding()
                {
                    self.set_state(ConversationStatus::Listening);
                }
            }
        }
    }

    fn on_speech_start(&mut self, preroll: &[f32], now: Instant) {
        if !self.connected || self.status.is_terminal() {
            return;
        }
        tracing::debug!("User started speaking");

        self.user_speaking = true;
        self.awaiting_response = false;
        self.idle.clear();

        if self.playback.is_playing() {
            self.emit(SessionEvent::AssistantSpeaking(false));
        }
        if let Some(offset) = self.playback.interrupt(now) {
            tracing::debug!(offset_ms = offset.as_millis(), "Assistant interrupted");
        }
        self.reassembler.reset();
        self.segmenter.reset();

        match self.uplink.begin(preroll) {
            Ok(messages) => self.send_all(messages),
            Err(e) => tracing::warn!(error = %e, "Failed to encode speech pre-roll"),
        }

        self.set_state(ConversationStatus::UserSpeaking);
    }

    fn on_speech_end(&mut self, audio: &[f32], misfire: bool, now: Instant) {
        if !self.user_speaking {
            return;
        }
        self.user_speaking = false;

        let finished = if misfire {
            self.uplink.abort();
            None
        } else {
            match self.uplink.finish(audio) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode utterance, discarding turn");
                    None
                }
            }
        };

        match finished {
            Some(messages) => {
                tracing::debug!(
                    duration_ms = self.uplink.duration_of(audio.len()).as_millis(),
                    "Utterance complete"
                );
                self.send_all(messages);
                self.playback.discard_mark();
                self.segmenter.clear_buffer();
                self.awaiting_response = true;
                self.set_state(ConversationStatus::Thinking);
            }
            None => {
                tracing::debug!(misfire, "Utterance too short, resuming");
                self.drain_and_signal(now);
            }
        }
    }

    // ── Timers & playback ──────────────────────────────────────────

    /// The idle timer's deadline passed.
    pub fn handle_idle_timeout(&mut self, now: Instant) {
        if !self.idle.fire(now) {
            return;
        }

        let underlying = self.warning.map_or(self.status, |w| w.restore);
        if underlying != ConversationStatus::Listening
            || !self.connected
            || self.user_speaking
            || self.playback.is_playing()
        {
            tracing::debug!(status = ?underlying, "Idle timer fired outside listening, ignored");
            return;
        }

        tracing::debug!("User idle, requesting a nudge");
        self.transport.send(ClientMessage::UserIdle);
        self.awaiting_response = true;
        self.set_state(ConversationStatus::Thinking);
    }

    /// A countdown tick may be due.
    pub fn handle_countdown_tick(&mut self, now: Instant) {
        if let Some(remaining) = self.countdown.tick(now) {
            self.emit(SessionEvent::RemainingTime(Some(remaining)));
        }
    }

    /// The current clip's completion deadline may have passed.
    pub fn handle_playback_finished(&mut self, now: Instant) {
        if self.playback.finish(now) {
            self.emit(SessionEvent::AssistantSpeaking(false));
            self.drain_and_signal(now);
        }
    }

    /// The warning overlay may have expired.
    pub fn handle_warning_elapsed(&mut self, now: Instant) {
        let Some(warning) = self.warning else {
            return;
        };
        if now < warning.until {
            return;
        }
        self.warning = None;
        if self.status == ConversationStatus::Warning {
            self.set_state(warning.restore);
        }
    }

    /// Play whatever is next, or settle into listening when nothing is left.
    fn drain_and_signal(&mut self, now: Instant) {
        if !self.connected || self.status.is_terminal() || self.user_speaking {
            return;
        }
        if self.playback.is_playing() {
            return;
        }

        let outcome = self.playback.play_next(&mut self.reassembler, now);
        for message in outcome.failures {
            self.emit(SessionEvent::Error {
                kind: ErrorKind::Playback,
                message,
            });
        }

        if outcome.started {
            self.idle.clear();
            self.set_state(ConversationStatus::AssistantSpeaking);
            self.emit(SessionEvent::AssistantSpeaking(true));
        } else if self.reply_outstanding() {
            if self.status == ConversationStatus::AssistantSpeaking {
                self.set_state(ConversationStatus::Generating);
            }
        } else {
            self.set_state(ConversationStatus::Listening);
            self.idle.arm(now);
        }
    }

    /// The reply is still being generated or some requested audio has not
    /// arrived yet.
    fn reply_outstanding(&self) -> bool {
        self.awaiting_response || self.reassembler.is_awaiting_audio()
    }

    // ── Event loop ─────────────────────────────────────────────────

    /// Drive the session until it completes or the transport gives up.
    pub async fn run(
        mut self,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> SessionOutcome {
        let Some(mut frames) = self.frames_rx.take() else {
            tracing::error!("Session already ran");
            return self.outcome();
        };

        self.emit(SessionEvent::StatusChanged(self.status));

        while !self.finished {
            let idle = self.idle.deadline();
            let tick = self.countdown.deadline();
            let playback = self.playback.completion_deadline();
            let warning = self.warning.map(|w| w.until);

            tokio::select! {
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport(event, Instant::now()),
                    None => {
                        tracing::debug!("Transport channel closed");
                        break;
                    }
                },
                Some(samples) = frames.recv() => self.handle_audio_frames(&samples, Instant::now()),
                () = sleep_until_opt(playback) => self.handle_playback_finished(Instant::now()),
                () = sleep_until_opt(idle) => self.handle_idle_timeout(Instant::now()),
                () = sleep_until_opt(tick) => self.handle_countdown_tick(Instant::now()),
                () = sleep_until_opt(warning) => self.handle_warning_elapsed(Instant::now()),
            }
        }

        let _ = self.gate.stop();
        self.playback.halt();
        self.transport.shutdown();
        tracing::info!(status = ?self.status, "Session ended");
        self.outcome()
    }

    fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            status: self.status,
            remaining_seconds: self.countdown.remaining(),
        }
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn send_all(&self, messages: Vec<ClientMessage>) {
        for message in messages {
            self.transport.send(message);
        }
    }

    fn set_state(&mut self, new_state: ConversationStatus) {
        if new_state != ConversationStatus::Warning {
            self.warning = None;
        }
        if self.status != new_state {
            tracing::debug!(old = ?self.status, new = ?new_state, "Conversation status transition");
            self.status = new_state;
            self.emit(SessionEvent::StatusChanged(new_state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::warn!("Session event receiver dropped");
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
