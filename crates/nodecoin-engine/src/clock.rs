//! Wall-clock to tick mapping.
//!
//! A tick is the indivisible simulation step. The clock is a pure function of
//! its inputs: the node's start time and the configured tick duration. Tick
//! numbers are computed, never accumulated, so two nodes with the same start
//! time agree on tick boundaries regardless of when they last looked.

// ---------------------------------------------------------------------------
// TickClock
// ---------------------------------------------------------------------------

/// Default wall-clock duration of one tick, in milliseconds.
pub const DEFAULT_TICK_DURATION_MS: u64 = 60_000;

/// Maps wall-clock timestamps (milliseconds) to tick numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickClock {
    /// Timestamp of tick 0, in milliseconds.
    pub start_time: u64,
    /// Duration of one tick, in milliseconds. Always positive.
    pub tick_duration: u64,
}

impl TickClock {
    /// Create a clock starting at `start_time` with the default duration.
    pub fn new(start_time: u64) -> Self {
        Self::with_duration(start_time, DEFAULT_TICK_DURATION_MS)
    }

    /// Create a clock with an explicit tick duration.
    ///
    /// # Panics
    ///
    /// Panics if `tick_duration` is zero.
    pub fn with_duration(start_time: u64, tick_duration: u64) -> Self {
        assert!(tick_duration > 0, "tick_duration must be positive");
        Self {
            start_time,
            tick_duration,
        }
    }

    /// The tick that `now` falls into. Times before `start_time` map to 0.
    pub fn current_tick(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_time) / self.tick_duration
    }

    /// How many ticks need processing to catch up from `last` to `now`.
    pub fn ticks_to_process(&self, last_tick_processed: u64, now: u64) -> u64 {
        self.current_tick(now).saturating_sub(last_tick_processed)
    }

    /// Wall-clock timestamp at which tick `t` begins.
    pub fn tick_timestamp(&self, t: u64) -> u64 {
        self.start_time + t * self.tick_duration
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
