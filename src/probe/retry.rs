//! Retry Budget
//!
//! Explicit retry policy for the capacity probe. Two modes: immediate
//! reissue (invalid sense, unrecognized sense) and delayed reissue (device
//! reports a reset/busy attention). Each mode has its own bounded budget so
//! immediate retries cannot starve the delayed budget or loop forever.

use std::time::Duration;

/// How the next attempt should be issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Reissue right away
    Immediate,
    /// Wait the fixed delay, then reissue
    Delayed,
}

/// Bounded two-mode retry budget
#[derive(Debug, Clone)]
pub struct RetryBudget {
    immediate_left: u32,
    delayed_left: u32,
    delay: Duration,
    attempts: u32,
}

/// Soft retries tolerated while the device reports busy
pub const CAPACITY_SOFT_RETRIES: u32 = 3;

/// Bound on immediate reissues for invalid/unrecognized sense
pub const CAPACITY_IMMEDIATE_RETRIES: u32 = 4;

/// Fixed wait applied before a delayed reissue
pub const CAPACITY_RETRY_DELAY: Duration = Duration::from_millis(500);

impl RetryBudget {
    pub fn new(immediate: u32, delayed: u32, delay: Duration) -> Self {
        Self {
            immediate_left: immediate,
            delayed_left: delayed,
            delay,
            attempts: 0,
        }
    }

    /// Consume one retry token in the given mode
    ///
    /// Returns `false` when that mode's budget is exhausted; the delayed
    /// mode sleeps before returning `true`.
    pub fn acquire(&mut self, mode: RetryMode) -> bool {
        match mode {
            RetryMode::Immediate => {
                if self.immediate_left == 0 {
                    return false;
                }
                self.immediate_left -= 1;
            }
            RetryMode::Delayed => {
                if self.delayed_left == 0 {
                    return false;
                }
                self.delayed_left -= 1;
                if !self.delay.is_zero() {
                    std::thread::sleep(self.delay);
                }
            }
        }
        self.attempts += 1;
        true
    }

    /// Delayed retries still available
    pub fn delayed_left(&self) -> u32 {
        self.delayed_left
    }

    /// Retry tokens consumed so far, for diagnostics
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(
            CAPACITY_IMMEDIATE_RETRIES,
            CAPACITY_SOFT_RETRIES,
            CAPACITY_RETRY_DELAY,
        )
    }
}
