//! Outcome of a single rate limit check.

use chrono::{DateTime, Utc};

/// Result of checking or inspecting a counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    allowed: bool,
    attempts: u64,
    remaining: u64,
    reset_at: DateTime<Utc>,
}

impl RateLimitResult {
    /// A result that admits the request.
    pub fn allowed(attempts: u64, remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            attempts,
            remaining,
            reset_at,
        }
    }

    /// A result that rejects the request. `remaining` is always zero.
    pub fn blocked(attempts: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            attempts,
            remaining: 0,
            reset_at,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn is_blocked(&self) -> bool {
        !self.allowed
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Reset time as Unix epoch seconds.
    pub fn reset_timestamp(&self) -> i64 {
        self.reset_at.timestamp()
    }

    /// Whole seconds from `now` until the reset time, never negative.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now).num_seconds().max(0) as u64
    }
}
