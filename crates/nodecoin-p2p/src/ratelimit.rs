//! Per-sender sliding-window rate limiting.
//!
//! Enforced inside the chain broadcaster BEFORE any signature work, so a
//! flooding peer cannot buy CPU with garbage. Excess messages are silently
//! dropped; the sender is not punished beyond the window.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// Default: 60 messages per 60 seconds per sender.
pub const DEFAULT_MAX_MESSAGES: usize = 60;
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Sliding-window limiter keyed by sender id.
pub struct RateLimiter {
    max_messages: usize,
    window_ms: u64,
    arrivals: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl RateLimiter {
    pub fn new(max_messages: usize, window_ms: u64) -> Self {
        Self {
            max_messages,
            window_ms,
            arrivals: Mutex::new(HashMap::new()),
        }
    }

    /// Record an arrival from `sender` at `now`; `true` if within budget.
    pub fn allow(&self, sender: &str, now: u64) -> bool {
        let mut arrivals = self.arrivals.lock();
        let window = arrivals.entry(sender.to_owned()).or_default();
        let cutoff = now.saturating_sub(self.window_ms);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        if window.len() >= self.max_messages {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop bookkeeping for senders silent since `cutoff`.
    pub fn compact(&self, now: u64) {
        let cutoff = now.saturating_sub(self.window_ms);
        self.arrivals
            .lock()
            .retain(|_, window| window.back().is_some_and(|t| *t >= cutoff));
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, DEFAULT_WINDOW_MS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
