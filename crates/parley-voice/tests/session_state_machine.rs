//! Integration tests for the `ConversationSession` state machine.
//!
//! These tests drive the session through complete turns using a mock
//! microphone, a recording speaker and an in-memory transport handle. No
//! audio hardware or network access is required.
//!
//! # What is tested
//!
//! - Connect, speak, generate, synthesize and play back in order
//! - Barge-in: a short interruption resumes, a real turn discards the mark
//! - Disconnect resets turn state and drops stale audio
//! - Undecodable audio is skipped
//! - Countdown, timer warnings and completion
//! - The idle nudge, both stepped and through the async event loop

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use parley_core::{
    CaptureMode, ClientMessage, ConversationStatus, ErrorKind, ServerMessage, SessionSettings,
};
use parley_voice::{
    AudioClip, AudioSink, AudioSource, ConversationSession, PlaybackEngine, SessionEvent,
    TransportEvent, TransportHandle, VoiceActivityGate, VoiceError, encode_wav_base64,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ── Mock devices ───────────────────────────────────────────────────

/// Microphone that records whether it is held open.
#[derive(Clone, Default)]
struct MockMic {
    open: Rc<Cell<bool>>,
    opens: Rc<Cell<u32>>,
    fail: Rc<Cell<bool>>,
}

impl AudioSource for MockMic {
    fn open(&mut self, _frames: UnboundedSender<Vec<f32>>) -> Result<(), VoiceError> {
        if self.fail.get() {
            return Err(VoiceError::NoInputDevice);
        }
        self.open.set(true);
        self.opens.set(self.opens.get() + 1);
        Ok(())
    }

    fn close(&mut self) {
        self.open.set(false);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SinkCall {
    Start { samples: usize, offset: Duration },
    Stop,
}

/// Speaker that records every call.
#[derive(Clone, Default)]
struct RecordingSink {
    calls: Rc<RefCell<Vec<SinkCall>>>,
}

impl RecordingSink {
    fn starts(&self) -> Vec<(usize, Duration)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Start { samples, offset } => Some((*samples, *offset)),
                SinkCall::Stop => None,
            })
            .collect()
    }

    fn last(&self) -> Option<SinkCall> {
        self.calls.borrow().last().cloned()
    }
}

impl AudioSink for RecordingSink {
    fn start(&mut self, clip: &AudioClip, offset: Duration) -> Result<(), VoiceError> {
        self.calls.borrow_mut().push(SinkCall::Start {
            samples: clip.samples.len(),
            offset,
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.borrow_mut().push(SinkCall::Stop);
    }
}

// ── Rig ────────────────────────────────────────────────────────────

struct Rig {
    session: ConversationSession,
    events: UnboundedReceiver<SessionEvent>,
    outbound: UnboundedReceiver<ClientMessage>,
    transport: TransportHandle,
    mic: MockMic,
    sink: RecordingSink,
    t0: Instant,
}

impl Rig {
    fn new(settings: &SessionSettings) -> Self {
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let transport = TransportHandle::new(outbound_tx, CancellationToken::new());
        let mic = MockMic::default();
        let sink = RecordingSink::default();

        let gate = VoiceActivityGate::with_energy_detector(Box::new(mic.clone()), settings.vad.clone());
        let playback = PlaybackEngine::new(Box::new(sink.clone()));
        let (session, events) = ConversationSession::new(settings, transport.clone(), gate, playback);

        Self {
            session,
            events,
            outbound,
            transport,
            mic,
            sink,
            t0: Instant::now(),
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn connect(&mut self, ms: u64) {
        let now = self.at(ms);
        self.session.handle_transport(TransportEvent::Opened, now);
    }

    fn server(&mut self, message: ServerMessage, ms: u64) {
        let now = self.at(ms);
        self.session
            .handle_transport(TransportEvent::Message(message), now);
    }

    fn tokens(&mut self, tokens: &[&str], ms: u64) {
        for token in tokens {
            self.server(
                ServerMessage::LlmToken {
                    token: (*token).to_string(),
                },
                ms,
            );
        }
    }

    fn chunk(&mut self, index: u32, audio: String, ms: u64) {
        self.server(ServerMessage::TtsAudioChunk { index, audio }, ms);
    }

    /// `loud` frames of speech followed by enough silence to end the turn.
    fn speak(&mut self, loud: usize, ms: u64) {
        let now = self.at(ms);
        self.session.handle_audio_frames(&utterance(loud), now);
    }

    fn sent(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(m) = self.outbound.try_recv() {
            messages.push(m);
        }
        messages
    }

    fn sent_kinds(&mut self) -> Vec<&'static str> {
        self.sent().iter().map(ClientMessage::kind).collect()
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            events.push(e);
        }
        events
    }

    /// Connect and speak one valid utterance so a reply can follow.
    fn into_reply(&mut self) {
        self.connect(0);
        self.speak(20, 1_000);
        self.sent();
        self.drain_events();
    }
}

// ── Helpers ────────────────────────────────────────────────────────

const FRAME: usize = 512;

fn utterance(loud: usize) -> Vec<f32> {
    let mut samples = vec![0.5_f32; loud * FRAME];
    samples.extend(std::iter::repeat_n(0.0_f32, 8 * FRAME));
    samples
}

/// `ms` milliseconds of audio at 1 kHz.
fn wav(ms: usize) -> String {
    encode_wav_base64(&vec![0.1; ms], 1_000).unwrap()
}

fn statuses_from(events: &[SessionEvent]) -> Vec<ConversationStatus> {
    events
        .iter()
        .filter_map(|e| {
            if let SessionEvent::StatusChanged(s) = e {
                Some(*s)
            } else {
                None
            }
        })
        .collect()
}

fn errors_from(events: &[SessionEvent]) -> Vec<ErrorKind> {
    events
        .iter()
        .filter_map(|e| {
            if let SessionEvent::Error { kind, .. } = e {
                Some(*kind)
            } else {
                None
            }
        })
        .collect()
}

fn tts(sentence: &str, index: u32) -> ClientMessage {
    ClientMessage::TtsRequest {
        sentence: sentence.to_string(),
        index,
    }
}

// ── Turn flow ──────────────────────────────────────────────────────

#[test]
fn initial_status_is_connecting() {
    let rig = Rig::new(&SessionSettings::with_defaults());
    assert_eq!(rig.session.status(), ConversationStatus::Connecting);
    assert!(!rig.mic.open.get());
}

#[test]
fn connect_opens_mic_and_arms_idle_timer() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);

    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert!(rig.mic.open.get());
    assert_eq!(rig.session.idle_timer().deadline(), Some(rig.at(12_000)));
}

#[test]
fn full_turn_streams_speech_and_plays_reply_in_order() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);
    rig.drain_events();

    // 20 loud frames + 8 silent = 14_336 samples, one full 8_000-sample chunk
    rig.speak(20, 1_000);
    assert_eq!(
        rig.sent_kinds(),
        vec!["start_speech_stream", "audio_chunk", "audio_chunk", "end_speech_stream"]
    );
    assert_eq!(rig.session.status(), ConversationStatus::Thinking);
    assert!(!rig.session.idle_timer().is_armed());

    rig.server(
        ServerMessage::Transcription {
            user_text: "Tell me about yourself".to_string(),
        },
        1_500,
    );
    rig.tokens(&["Hello", " there.", " How", " are you?"], 2_000);
    assert_eq!(rig.sent(), vec![tts("Hello there.", 0)]);
    assert_eq!(rig.session.status(), ConversationStatus::Generating);

    rig.server(ServerMessage::LlmEnd, 2_100);
    assert_eq!(rig.sent(), vec![tts("How are you?", 1)]);
    // both clips still outstanding
    assert_eq!(rig.session.status(), ConversationStatus::Generating);
    assert!(!rig.session.idle_timer().is_armed());

    // synthesized out of order
    rig.chunk(1, wav(300), 2_500);
    assert!(!rig.session.playback().is_playing());
    rig.chunk(0, wav(500), 2_600);
    assert_eq!(rig.session.status(), ConversationStatus::AssistantSpeaking);
    assert!(!rig.session.idle_timer().is_armed());

    rig.session.handle_playback_finished(rig.at(3_100));
    assert_eq!(rig.session.status(), ConversationStatus::AssistantSpeaking);
    rig.session.handle_playback_finished(rig.at(3_400));

    assert_eq!(rig.sink.starts(), vec![
        (500, Duration::ZERO),
        (300, Duration::ZERO)
    ]);
    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert_eq!(rig.session.idle_timer().deadline(), Some(rig.at(15_400)));

    let events = rig.drain_events();
    assert_eq!(statuses_from(&events), vec![
        ConversationStatus::UserSpeaking,
        ConversationStatus::Thinking,
        ConversationStatus::Generating,
        ConversationStatus::AssistantSpeaking,
        ConversationStatus::Listening,
    ]);
    assert!(events.contains(&SessionEvent::UserTranscript {
        text: "Tell me about yourself".to_string(),
        is_final: true,
    }));
    assert!(events.contains(&SessionEvent::AssistantSpeaking(true)));
}

#[test]
fn slow_synthesis_does_not_trigger_an_idle_nudge() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["Hello there.", " How are you?"], 2_000);
    rig.server(ServerMessage::LlmEnd, 2_100);
    rig.sent();

    assert_eq!(rig.session.status(), ConversationStatus::Generating);
    assert!(rig.session.reassembler().is_awaiting_audio());
    assert!(!rig.session.idle_timer().is_armed());

    // well past the idle interval, audio still on its way
    rig.session.handle_idle_timeout(rig.at(14_100));
    assert!(rig.sent().is_empty());

    rig.chunk(0, wav(500), 14_200);
    rig.chunk(1, wav(500), 14_300);
    assert_eq!(rig.session.status(), ConversationStatus::AssistantSpeaking);
    rig.session.handle_playback_finished(rig.at(14_700));
    rig.session.handle_playback_finished(rig.at(15_200));

    assert_eq!(rig.sink.starts().len(), 2);
    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert_eq!(rig.session.idle_timer().deadline(), Some(rig.at(27_200)));
}

#[test]
fn utterance_mode_sends_single_user_audio() {
    let settings = SessionSettings {
        capture_mode: CaptureMode::Utterance,
        ..SessionSettings::with_defaults()
    };
    let mut rig = Rig::new(&settings);
    rig.connect(0);
    rig.speak(20, 1_000);

    assert_eq!(rig.sent_kinds(), vec!["user_audio"]);
    assert_eq!(rig.session.status(), ConversationStatus::Thinking);
}

#[test]
fn unrequested_audio_is_not_played() {
    let settings = SessionSettings {
        capture_mode: CaptureMode::Utterance,
        ..SessionSettings::with_defaults()
    };
    let mut rig = Rig::new(&settings);
    rig.connect(0);
    rig.drain_events();

    // an announcement clip pushed without any synthesis request
    rig.chunk(0, wav(500), 1_000);

    assert!(!rig.session.playback().is_playing());
    assert!(rig.sink.starts().is_empty());
    assert_eq!(rig.session.reassembler().expected_index(), 0);
    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert!(rig.drain_events().is_empty());
}

#[test]
fn short_noise_returns_to_listening_without_a_turn() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);

    // two loud frames: below the minimum positive-frame count
    rig.speak(2, 1_000);

    assert_eq!(rig.sent_kinds(), vec!["start_speech_stream"]);
    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert!(!rig.session.is_awaiting_response());
    assert_eq!(rig.session.idle_timer().deadline(), Some(rig.at(13_000)));
}

#[test]
fn short_noise_leaves_sequence_indices_alone() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["First one.", " Second one.", " Third"], 2_000);
    assert_eq!(rig.session.segmenter().next_index(), 2);
    rig.chunk(0, wav(2_000), 2_100);
    assert_eq!(rig.session.reassembler().expected_index(), 1);
    rig.sent();

    // speech start begins a new turn and resets both counters
    rig.session.handle_audio_frames(&[0.5; 2 * FRAME], rig.at(2_500));
    assert!(rig.session.is_user_speaking());
    let next_index = rig.session.segmenter().next_index();
    let expected = rig.session.reassembler().expected_index();
    assert_eq!((next_index, expected), (0, 0));

    // too short to count: the end of it must not touch them
    rig.session.handle_audio_frames(&[0.0; 8 * FRAME], rig.at(2_800));
    assert!(!rig.session.is_user_speaking());
    assert_eq!(rig.session.segmenter().next_index(), next_index);
    assert_eq!(rig.session.reassembler().expected_index(), expected);
    assert_eq!(rig.sent_kinds(), vec!["start_speech_stream"]);
    assert_eq!(rig.session.status(), ConversationStatus::AssistantSpeaking);
}

// ── Barge-in ───────────────────────────────────────────────────────

#[test]
fn short_interruption_resumes_where_playback_stopped() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["Let me explain."], 2_000);
    rig.server(ServerMessage::LlmEnd, 2_000);
    rig.chunk(0, wav(2_000), 2_000);
    assert!(rig.session.playback().is_playing());

    rig.speak(2, 2_700);

    assert_eq!(rig.sink.starts(), vec![
        (2_000, Duration::ZERO),
        (2_000, Duration::from_millis(700))
    ]);
    assert_eq!(rig.session.status(), ConversationStatus::AssistantSpeaking);
    assert!(!rig.session.playback().has_mark());
    assert_eq!(
        rig.session.playback().completion_deadline(),
        Some(rig.at(4_000))
    );

    let statuses = statuses_from(&rig.drain_events());
    assert!(statuses.contains(&ConversationStatus::UserSpeaking));
    assert_eq!(statuses.last(), Some(&ConversationStatus::AssistantSpeaking));
}

#[test]
fn real_interruption_discards_resume_mark() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["Let me explain."], 2_000);
    rig.server(ServerMessage::LlmEnd, 2_000);
    rig.chunk(0, wav(2_000), 2_000);

    rig.speak(20, 2_700);

    assert_eq!(rig.session.status(), ConversationStatus::Thinking);
    assert!(!rig.session.playback().is_playing());
    assert!(!rig.session.playback().has_mark());
    assert_eq!(rig.sink.last(), Some(SinkCall::Stop));
    assert_eq!(rig.sink.starts().len(), 1);
}

#[test]
fn interruption_drops_audio_of_the_superseded_reply() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["First one.", " Second one."], 2_000);
    rig.server(ServerMessage::LlmEnd, 2_000);
    rig.chunk(0, wav(1_000), 2_000);

    rig.speak(20, 2_500);
    // index 1 belongs to the reply that was talked over
    rig.chunk(1, wav(1_000), 2_600);

    assert_eq!(rig.sink.starts().len(), 1);
    assert!(!rig.session.playback().is_playing());
    assert_eq!(rig.session.segmenter().next_index(), 0);
}

#[test]
fn cancelled_while_user_speaking_keeps_the_floor() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);

    // speech starts but has not ended yet
    let now = rig.at(1_000);
    rig.session.handle_audio_frames(&[0.5; 4 * FRAME], now);
    assert!(rig.session.is_user_speaking());

    rig.server(ServerMessage::Cancelled, 1_100);
    assert_eq!(rig.session.status(), ConversationStatus::UserSpeaking);

    rig.tokens(&["Stale reply."], 1_200);
    assert_eq!(rig.session.status(), ConversationStatus::UserSpeaking);
    assert!(!rig.sent_kinds().contains(&"tts_request"));
}

#[test]
fn cancelled_while_thinking_returns_to_listening() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();

    rig.server(ServerMessage::Cancelled, 2_000);
    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert_eq!(rig.session.idle_timer().deadline(), Some(rig.at(14_000)));
}

// ── Connection ─────────────────────────────────────────────────────

#[test]
fn disconnect_resets_turn_and_rejects_stale_audio() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["One.", " Two."], 2_000);
    rig.server(ServerMessage::LlmEnd, 2_000);
    rig.chunk(0, wav(2_000), 2_000);
    rig.drain_events();

    rig.session.handle_transport(
        TransportEvent::Closed {
            reason: "connection reset".to_string(),
        },
        rig.at(2_500),
    );

    assert_eq!(rig.session.status(), ConversationStatus::Disconnected);
    assert!(!rig.mic.open.get());
    assert!(!rig.session.playback().is_playing());
    assert!(!rig.session.playback().has_mark());
    assert!(!rig.session.idle_timer().is_armed());
    let events = rig.drain_events();
    assert_eq!(errors_from(&events), vec![ErrorKind::Transport]);
    assert!(events.contains(&SessionEvent::AssistantSpeaking(false)));

    rig.connect(5_500);
    assert_eq!(rig.session.status(), ConversationStatus::Listening);
    assert_eq!(rig.mic.opens.get(), 2);

    rig.chunk(1, wav(500), 5_600);
    assert!(!rig.session.playback().is_playing());
    assert_eq!(rig.session.reassembler().queued_len(), 0);
}

#[test]
fn failed_attempts_before_first_connect_are_quiet() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.session.handle_transport(
        TransportEvent::Closed {
            reason: "refused".to_string(),
        },
        rig.at(0),
    );
    assert_eq!(rig.session.status(), ConversationStatus::Disconnected);
    assert!(errors_from(&rig.drain_events()).is_empty());

    rig.session
        .handle_transport(TransportEvent::Finished, rig.at(3_000));
    assert!(rig.session.is_finished());
    assert_eq!(errors_from(&rig.drain_events()), vec![ErrorKind::Transport]);
}

#[test]
fn microphone_failure_is_reported_and_session_continues() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.mic.fail.set(true);
    rig.connect(0);

    assert_eq!(rig.session.status(), ConversationStatus::Error);
    assert_eq!(errors_from(&rig.drain_events()), vec![ErrorKind::Device]);

    rig.tokens(&["Can you hear me?"], 1_000);
    assert_eq!(rig.session.status(), ConversationStatus::Generating);
}

// ── Playback failures ──────────────────────────────────────────────

#[test]
fn undecodable_chunk_is_skipped_and_reported() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();
    rig.tokens(&["One.", " Two."], 2_000);
    rig.server(ServerMessage::LlmEnd, 2_000);

    rig.chunk(1, wav(400), 2_100);
    rig.chunk(0, "bm90IGEgd2F2".to_string(), 2_200);

    assert_eq!(rig.sink.starts(), vec![(400, Duration::ZERO)]);
    assert_eq!(rig.session.status(), ConversationStatus::AssistantSpeaking);
    assert_eq!(errors_from(&rig.drain_events()), vec![ErrorKind::Playback]);
}

#[test]
fn peer_error_is_surfaced_and_inbound_still_processed() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.into_reply();

    rig.server(
        ServerMessage::Error {
            message: "speech recognition failed".to_string(),
        },
        2_000,
    );
    assert_eq!(rig.session.status(), ConversationStatus::Error);
    assert!(!rig.session.idle_timer().is_armed());
    assert_eq!(errors_from(&rig.drain_events()), vec![ErrorKind::Protocol]);

    rig.tokens(&["Sorry about that."], 2_500);
    assert_eq!(rig.session.status(), ConversationStatus::Generating);
}

// ── Timers ─────────────────────────────────────────────────────────

#[test]
fn idle_timeout_sends_one_nudge() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);
    rig.drain_events();

    rig.session.handle_idle_timeout(rig.at(11_999));
    assert!(rig.sent().is_empty());

    rig.session.handle_idle_timeout(rig.at(12_000));
    assert_eq!(rig.sent(), vec![ClientMessage::UserIdle]);
    assert_eq!(rig.session.status(), ConversationStatus::Thinking);

    rig.session.handle_idle_timeout(rig.at(24_000));
    assert!(rig.sent().is_empty());
}

#[test]
fn countdown_ticks_and_completion_freezes_it() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);
    rig.drain_events();

    rig.server(
        ServerMessage::TimerUpdate {
            remaining_seconds: 120,
            total_seconds: Some(1_800),
        },
        0,
    );
    rig.session.handle_countdown_tick(rig.at(500));
    rig.session.handle_countdown_tick(rig.at(1_000));
    rig.session.handle_countdown_tick(rig.at(2_000));
    assert_eq!(rig.session.countdown().remaining(), Some(118));

    rig.server(
        ServerMessage::SessionComplete {
            message: "Thanks for your time.".to_string(),
        },
        2_500,
    );
    assert_eq!(rig.session.status(), ConversationStatus::Complete);
    assert!(!rig.mic.open.get());
    assert!(!rig.session.countdown().is_running());
    assert!(rig.transport.is_shut_down());

    let events = rig.drain_events();
    assert_eq!(
        events,
        vec![
            SessionEvent::RemainingTime(Some(120)),
            SessionEvent::RemainingTime(Some(119)),
            SessionEvent::RemainingTime(Some(118)),
            SessionEvent::StatusChanged(ConversationStatus::Complete),
            SessionEvent::Notice("Thanks for your time.".to_string()),
            SessionEvent::RemainingTime(Some(118)),
        ]
    );

    rig.session.handle_transport(
        TransportEvent::Closed {
            reason: "closed by peer".to_string(),
        },
        rig.at(3_000),
    );
    assert!(rig.session.is_finished());
    assert_eq!(rig.session.status(), ConversationStatus::Complete);
    assert!(rig.drain_events().is_empty());
}

#[test]
fn warning_is_shown_then_prior_status_restored() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);
    rig.drain_events();

    rig.server(
        ServerMessage::TimerWarning {
            message: "Two minutes left".to_string(),
        },
        1_000,
    );
    assert_eq!(rig.session.status(), ConversationStatus::Warning);

    rig.session.handle_warning_elapsed(rig.at(4_999));
    assert_eq!(rig.session.status(), ConversationStatus::Warning);
    rig.session.handle_warning_elapsed(rig.at(5_000));
    assert_eq!(rig.session.status(), ConversationStatus::Listening);

    assert_eq!(rig.drain_events(), vec![
        SessionEvent::StatusChanged(ConversationStatus::Warning),
        SessionEvent::Notice("Two minutes left".to_string()),
        SessionEvent::StatusChanged(ConversationStatus::Listening),
    ]);
}

#[test]
fn idle_timer_still_nudges_behind_a_warning() {
    let mut rig = Rig::new(&SessionSettings::with_defaults());
    rig.connect(0);
    rig.server(
        ServerMessage::TimerWarning {
            message: "One minute left".to_string(),
        },
        10_000,
    );

    rig.session.handle_idle_timeout(rig.at(12_000));
    assert_eq!(rig.sent(), vec![ClientMessage::UserIdle]);
    assert_eq!(rig.session.status(), ConversationStatus::Thinking);

    // the overlay is gone, nothing left to restore
    rig.session.handle_warning_elapsed(rig.at(14_000));
    assert_eq!(rig.session.status(), ConversationStatus::Thinking);
}

// ── Event loop ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn run_loop_nudges_when_idle_and_ends_on_completion() {
    let Rig {
        session,
        mut events,
        mut outbound,
        transport,
        ..
    } = Rig::new(&SessionSettings::with_defaults());
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    transport_tx.send(TransportEvent::Opened).unwrap();

    let script = async {
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(outbound.try_recv().ok(), Some(ClientMessage::UserIdle));

        transport_tx
            .send(TransportEvent::Message(ServerMessage::SessionComplete {
                message: "Done".to_string(),
            }))
            .unwrap();
        transport_tx
            .send(TransportEvent::Closed {
                reason: "closed by peer".to_string(),
            })
            .unwrap();
    };

    let (outcome, ()) = tokio::join!(session.run(transport_rx), script);

    assert!(outcome.is_complete());
    assert!(transport.is_shut_down());

    let mut emitted = Vec::new();
    while let Ok(e) = events.try_recv() {
        emitted.push(e);
    }
    let statuses = statuses_from(&emitted);
    assert_eq!(statuses, vec![
        ConversationStatus::Connecting,
        ConversationStatus::Listening,
        ConversationStatus::Thinking,
        ConversationStatus::Complete,
    ]);
}
