//! Idle and countdown timers.
//!
//! Neither timer sleeps on its own. Each exposes the next deadline and the
//! session's event loop sleeps until the earliest one, then calls `fire` or
//! `tick`. Arming again replaces the deadline, so timers never stack.

use std::time::Duration;

use tokio::time::Instant;

/// Single-shot timer that fires once per arm.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// (Re)start the interval from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub const fn clear(&mut self) {
        self.deadline = None;
    }

    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and report whether the deadline had passed.
    ///
    /// Returns `false` (and stays armed) when called early.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

const TICK: Duration = Duration::from_secs(1);

/// Once-per-second countdown of the session's remaining time.
///
/// The peer's `timer_update` is authoritative; local ticks only keep the
/// display moving between updates.
#[derive(Debug, Clone, Default)]
pub struct CountdownTimer {
    remaining: Option<u64>,
    next_tick: Option<Instant>,
}

impl CountdownTimer {
    pub const fn new() -> Self {
        Self {
            remaining: None,
            next_tick: None,
        }
    }

    /// Adopt an authoritative value and restart ticking from `now`.
    pub fn set_remaining(&mut self, seconds: u64, now: Instant) {
        self.remaining = Some(seconds);
        self.next_tick = (seconds > 0).then(|| now + TICK);
    }

    /// Advance if a tick is due. Returns the new remaining value when it changed.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        let next = self.next_tick?;
        if now < next {
            return None;
        }
        let remaining = self.remaining?.saturating_sub(1);
        self.remaining = Some(remaining);
        self.next_tick = (remaining > 0).then(|| next + TICK);
        Some(remaining)
    }

    /// Stop ticking but keep the displayed value.
    pub const fn freeze(&mut self) {
        self.next_tick = None;
    }

    /// Stop ticking and forget the value.
    pub const fn clear(&mut self) {
        self.remaining = None;
        self.next_tick = None;
    }

    pub const fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    pub const fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }
}
