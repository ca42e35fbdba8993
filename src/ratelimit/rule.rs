//! Rate limit rules.

use chrono::Duration;

use crate::error::{Result, TollgateError};

/// Smallest allowed `max_attempts`.
pub const MIN_ATTEMPTS: u32 = 1;
/// Largest allowed `max_attempts`.
pub const MAX_ATTEMPTS: u32 = 10_000;
/// Smallest allowed decay window in minutes.
pub const MIN_DECAY_MINUTES: u32 = 1;
/// Largest allowed decay window in minutes.
pub const MAX_DECAY_MINUTES: u32 = 60;

/// How many attempts are allowed per decay window for one endpoint type.
///
/// Always valid once constructed: the endpoint type is non-empty and both
/// numeric fields are within their bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitRule {
    endpoint_type: String,
    max_attempts: u32,
    decay_minutes: u32,
}

impl RateLimitRule {
    /// Create a validated rule.
    pub fn new(endpoint_type: impl Into<String>, max_attempts: u32, decay_minutes: u32) -> Result<Self> {
        let endpoint_type = endpoint_type.into();

        if endpoint_type.is_empty() {
            return Err(TollgateError::InvalidRule(
                "endpoint type cannot be empty".to_string(),
            ));
        }
        if !(MIN_ATTEMPTS..=MAX_ATTEMPTS).contains(&max_attempts) {
            return Err(TollgateError::InvalidRule(format!(
                "max_attempts must be between {} and {}, got {}",
                MIN_ATTEMPTS, MAX_ATTEMPTS, max_attempts
            )));
        }
        if !(MIN_DECAY_MINUTES..=MAX_DECAY_MINUTES).contains(&decay_minutes) {
            return Err(TollgateError::InvalidRule(format!(
                "decay_minutes must be between {} and {}, got {}",
                MIN_DECAY_MINUTES, MAX_DECAY_MINUTES, decay_minutes
            )));
        }

        Ok(Self {
            endpoint_type,
            max_attempts,
            decay_minutes,
        })
    }

    /// Built-in 30 attempts per minute rule used when configuration is unusable.
    pub fn fallback() -> Self {
        Self {
            endpoint_type: "default".to_string(),
            max_attempts: 30,
            decay_minutes: 1,
        }
    }

    pub fn endpoint_type(&self) -> &str {
        &self.endpoint_type
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn decay_minutes(&self) -> u32 {
        self.decay_minutes
    }

    pub fn decay_seconds(&self) -> u64 {
        u64::from(self.decay_minutes) * 60
    }

    /// The decay window as a duration.
    pub fn decay(&self) -> Duration {
        Duration::minutes(i64::from(self.decay_minutes))
    }

    /// Same rule with `max_attempts` multiplied by `factor`.
    ///
    /// The result saturates at [`MAX_ATTEMPTS`] so it stays a valid rule.
    pub fn relaxed(&self, factor: u32) -> Self {
        let max_attempts = self
            .max_attempts
            .saturating_mul(factor.max(1))
            .min(MAX_ATTEMPTS);
        Self {
            endpoint_type: self.endpoint_type.clone(),
            max_attempts,
            decay_minutes: self.decay_minutes,
        }
    }
}
