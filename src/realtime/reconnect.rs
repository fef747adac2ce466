// Reconnection policy: fixed delay, bounded consecutive attempts
// Author: kelexine (https://github.com/kelexine)

use backoff::backoff::{Backoff, Constant};
use std::time::Duration;

/// What to do after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Counts consecutive failures; a successful open resets the count.
#[derive(Debug)]
pub struct ReconnectPolicy {
    backoff: Constant,
    delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            backoff: Constant::new(delay),
            delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Record a failure. Retries while the count stays below the maximum.
    pub fn on_failure(&mut self) -> ReconnectDecision {
        self.attempts = self.attempts.saturating_add(1);

        if self.attempts < self.max_attempts {
            ReconnectDecision::Retry {
                attempt: self.attempts,
                delay: self.backoff.next_backoff().unwrap_or(self.delay),
            }
        } else {
            ReconnectDecision::GiveUp {
                attempts: self.attempts,
            }
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
