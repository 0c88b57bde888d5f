//! Incremental sentence segmentation for streamed assistant text.
//!
//! Tokens arrive a few characters at a time. As soon as a sentence is known
//! to be complete it becomes a [`TtsRequest`] so synthesis can start while
//! the rest of the reply is still streaming.

use parley_core::TtsRequest;

/// Accumulates streamed tokens and emits complete sentences.
///
/// A boundary is a run of end punctuation (`.`, `!`, `?`) followed by
/// whitespace and then an uppercase letter. The text after the last
/// boundary stays buffered until more tokens arrive or [`flush`](Self::flush)
/// is called, since a trailing `.` may still turn out to be `...` or part of
/// an abbreviation.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
    next_index: u32,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token and return every sentence it completed, in order.
    pub fn feed(&mut self, token: &str) -> Vec<TtsRequest> {
        self.buffer.push_str(token);

        let mut requests = Vec::new();
        let mut consumed = 0;
        for (end, next_start) in boundaries(&self.buffer) {
            let sentence = self.buffer[consumed..end].trim();
            if let Some(req) = Self::request(&mut self.next_index, sentence) {
                requests.push(req);
            }
            consumed = next_start;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        let leading_ws = self.buffer.len() - self.buffer.trim_start().len();
        self.buffer.drain(..leading_ws);

        requests
    }

    /// Emit whatever is buffered as a final sentence and clear the buffer.
    pub fn flush(&mut self) -> Option<TtsRequest> {
        let rest = std::mem::take(&mut self.buffer);
        Self::request(&mut self.next_index, rest.trim())
    }

    /// Start a new turn: buffer cleared, indices restart at 0.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_index = 0;
    }

    /// Drop unsent text without touching the index.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Index the next emitted sentence will carry.
    pub const fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Text received but not yet emitted.
    pub fn pending_text(&self) -> &str {
        &self.buffer
    }

    fn request(next_index: &mut u32, sentence: &str) -> Option<TtsRequest> {
        if !sentence.chars().any(char::is_alphanumeric) {
            return None;
        }
        let req = TtsRequest {
            index: *next_index,
            sentence: sentence.to_string(),
        };
        *next_index += 1;
        Some(req)
    }
}

const fn is_terminal_punct(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Byte ranges of sentence boundaries as `(sentence_end, next_sentence_start)`.
fn boundaries(text: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() && prev.is_some_and(is_terminal_punct) {
            let mut next_start = None;
            while let Some(&(j, n)) = chars.peek() {
                if n.is_whitespace() {
                    chars.next();
                } else {
                    next_start = Some((j, n));
                    break;
                }
            }
            if let Some((j, n)) = next_start {
                if n.is_uppercase() {
                    found.push((i, j));
                }
            }
            prev = Some(' ');
            continue;
        }
        prev = Some(c);
    }

    found
}
