//! Out-of-order audio chunk reassembly.
//!
//! Sentences are synthesized concurrently at the peer, so their audio can
//! arrive in any order. Chunks wait in a pending buffer until every lower
//! index has arrived, then move to the play queue in index order.

use std::collections::{BTreeMap, VecDeque};

/// One synthesized-audio chunk as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub index: u32,
    /// Encoded payload (base64 WAV, possibly a data URI).
    pub payload: String,
}

/// Why a chunk was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRejection {
    /// Index already released to the play queue.
    AlreadyReleased,
    /// Index never requested in the current turn.
    NotRequested,
    /// Same index is already pending.
    Duplicate,
}

/// Orders audio chunks by sequence index.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    pending: BTreeMap<u32, AudioChunk>,
    queue: VecDeque<AudioChunk>,
    expected: u32,
    /// Synthesis requests issued this turn; indices at or above are stale.
    issued: u32,
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a synthesis request with `index` was sent this turn.
    pub fn register_request(&mut self, index: u32) {
        self.issued = self.issued.max(index + 1);
    }

    /// Store a chunk and release every contiguous chunk from the expected
    /// index. Returns how many chunks were released.
    pub fn receive(&mut self, chunk: AudioChunk) -> Result<usize, ChunkRejection> {
        let index = chunk.index;
        if index < self.expected {
            tracing::debug!(index, expected = self.expected, "Dropping already-released chunk");
            return Err(ChunkRejection::AlreadyReleased);
        }
        if index >= self.issued {
            tracing::debug!(index, issued = self.issued, "Dropping chunk not requested this turn");
            return Err(ChunkRejection::NotRequested);
        }
        if self.pending.contains_key(&index) {
            tracing::debug!(index, "Dropping duplicate chunk");
            return Err(ChunkRejection::Duplicate);
        }

        self.pending.insert(index, chunk);
        Ok(self.drain())
    }

    /// Move contiguous chunks from the pending buffer into the play queue,
    /// stopping at the first gap.
    fn drain(&mut self) -> usize {
        let mut released = 0;
        while let Some(chunk) = self.pending.remove(&self.expected) {
            self.queue.push_back(chunk);
            self.expected += 1;
            released += 1;
        }
        if released > 0 {
            tracing::debug!(
                released,
                queued = self.queue.len(),
                pending = self.pending.len(),
                "Released audio chunks"
            );
        }
        released
    }

    /// Next chunk to play.
    pub fn pop(&mut self) -> Option<AudioChunk> {
        self.queue.pop_front()
    }

    /// Forget everything: new turn, nothing requested yet.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.queue.clear();
        self.expected = 0;
        self.issued = 0;
    }

    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub const fn expected_index(&self) -> u32 {
        self.expected
    }

    /// Whether some requested audio has not been released yet.
    pub const fn is_awaiting_audio(&self) -> bool {
        self.expected < self.issued
    }
}
