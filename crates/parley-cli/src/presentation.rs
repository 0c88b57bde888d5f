//! Terminal rendering of session events.

use std::io::{self, Write};

use parley_voice::SessionEvent;

/// Writes session events as lines of text.
///
/// Assistant tokens are printed inline as they stream; any other event ends
/// the reply line first.
pub struct EventPrinter<W: Write> {
    out: W,
    in_reply: bool,
}

impl<W: Write> EventPrinter<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out,
            in_reply: false,
        }
    }

    pub fn print(&mut self, event: &SessionEvent) -> io::Result<()> {
        if let SessionEvent::AssistantToken(token) = event {
            if !self.in_reply {
                write!(self.out, "assistant: ")?;
                self.in_reply = true;
            }
            write!(self.out, "{token}")?;
            return self.out.flush();
        }

        let Some(line) = render(event) else {
            return Ok(());
        };
        if std::mem::take(&mut self.in_reply) {
            writeln!(self.out)?;
        }
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// One line for an event, or `None` for events not worth a line.
pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StatusChanged(status) => Some(format!("[{}]", status.label())),
        SessionEvent::UserTranscript {
            text,
            is_final: true,
        } => Some(format!("you: {text}")),
        SessionEvent::UserTranscript { is_final: false, .. }
        | SessionEvent::AssistantToken(_)
        | SessionEvent::AssistantSpeaking(_)
        | SessionEvent::RemainingTime(None) => None,
        SessionEvent::RemainingTime(Some(seconds)) => {
            (seconds % 60 == 0 || *seconds <= 10).then(|| format!("[{} remaining]", clock(*seconds)))
        }
        SessionEvent::Notice(message) => Some(format!("* {message}")),
        SessionEvent::Error { kind, message } => Some(format!("! {} error: {message}", kind.label())),
    }
}

/// `m:ss` for a number of seconds.
pub fn clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
