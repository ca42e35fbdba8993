//! Rate limit metrics.
//!
//! Metrics are side effects only. Every method returns `()`, so a sink can
//! never veto or delay a throttling decision beyond the call itself.

use std::fmt;

use tracing::{error, info, warn};

use crate::ratelimit::{RateLimitKey, RateLimitRule};

/// Store latency at or above this is reported as slow.
pub const DEFAULT_SLOW_LATENCY_MS: f64 = 10.0;

/// Which store served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreLabel {
    Primary,
    Secondary,
}

impl StoreLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreLabel::Primary => "primary",
            StoreLabel::Secondary => "secondary",
        }
    }
}

impl fmt::Display for StoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a recorded event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Hits are informational when allowed, warnings when denied.
    pub fn for_hit(allowed: bool) -> Self {
        if allowed {
            Severity::Info
        } else {
            Severity::Warning
        }
    }

    /// A block means a 429 is going back to a caller.
    pub fn for_block() -> Self {
        Severity::Error
    }

    /// Degraded but serving when failed over, at risk otherwise.
    pub fn for_failure(failed_over: bool) -> Self {
        if failed_over {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }

    pub fn for_latency(latency_ms: f64, slow_threshold_ms: f64) -> Self {
        if latency_ms >= slow_threshold_ms {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// Receives rate limiting events.
pub trait MetricsSink: Send + Sync {
    /// A `check_limit` completed.
    fn record_hit(&self, key: &RateLimitKey, rule: &RateLimitRule, allowed: bool, attempts: u64);

    /// A request is being rejected.
    fn record_block(&self, key: &RateLimitKey, rule: &RateLimitRule, attempts: u64, retry_after_secs: u64);

    /// The primary store failed. `failed_over` tells whether the secondary served the call.
    fn record_failure(&self, key: &RateLimitKey, rule: &RateLimitRule, error: &str, failed_over: bool);

    /// Time spent in a store call.
    fn record_latency(&self, latency_ms: f64, store: StoreLabel);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_hit(&self, _: &RateLimitKey, _: &RateLimitRule, _: bool, _: u64) {}
    fn record_block(&self, _: &RateLimitKey, _: &RateLimitRule, _: u64, _: u64) {}
    fn record_failure(&self, _: &RateLimitKey, _: &RateLimitRule, _: &str, _: bool) {}
    fn record_latency(&self, _: f64, _: StoreLabel) {}
}

/// Emit a tracing event at the level matching a [`Severity`].
///
/// tracing has no critical level, so critical events go out at ERROR with
/// `severity = "critical"`.
macro_rules! emit {
    ($severity:expr, $event:literal, $($fields:tt)*) => {
        match $severity {
            Severity::Info => info!(severity = "info", $($fields)*, $event),
            Severity::Warning => warn!(severity = "warning", $($fields)*, $event),
            Severity::Error => error!(severity = "error", $($fields)*, $event),
            Severity::Critical => error!(severity = "critical", $($fields)*, $event),
        }
    };
}

/// Sink that writes structured log events.
#[derive(Debug, Clone)]
pub struct LogMetrics {
    hash_key: bool,
    slow_latency_ms: f64,
}

impl LogMetrics {
    /// `hash_key` logs the SHA-256 of each key instead of the raw key.
    pub fn new(hash_key: bool) -> Self {
        Self {
            hash_key,
            slow_latency_ms: DEFAULT_SLOW_LATENCY_MS,
        }
    }

    pub fn with_slow_latency_ms(mut self, threshold_ms: f64) -> Self {
        self.slow_latency_ms = threshold_ms;
        self
    }

    fn key_field(&self, key: &RateLimitKey) -> String {
        if self.hash_key {
            key.hashed()
        } else {
            key.as_str().to_string()
        }
    }
}

impl Default for LogMetrics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsSink for LogMetrics {
    fn record_hit(&self, key: &RateLimitKey, rule: &RateLimitRule, allowed: bool, attempts: u64) {
        emit!(
            Severity::for_hit(allowed),
            "rate_limit.hit",
            key = %self.key_field(key),
            endpoint_type = rule.endpoint_type(),
            max_attempts = rule.max_attempts(),
            decay_minutes = rule.decay_minutes(),
            allowed,
            attempts
        );
    }

    fn record_block(&self, key: &RateLimitKey, rule: &RateLimitRule, attempts: u64, retry_after_secs: u64) {
        emit!(
            Severity::for_block(),
            "rate_limit.blocked",
            key = %self.key_field(key),
            endpoint_type = rule.endpoint_type(),
            max_attempts = rule.max_attempts(),
            decay_minutes = rule.decay_minutes(),
            attempts,
            retry_after = retry_after_secs
        );
    }

    fn record_failure(&self, key: &RateLimitKey, rule: &RateLimitRule, error: &str, failed_over: bool) {
        emit!(
            Severity::for_failure(failed_over),
            "rate_limit.failure",
            key = %self.key_field(key),
            endpoint_type = rule.endpoint_type(),
            max_attempts = rule.max_attempts(),
            decay_minutes = rule.decay_minutes(),
            error,
            failed_over
        );
    }

    fn record_latency(&self, latency_ms: f64, store: StoreLabel) {
        emit!(
            Severity::for_latency(latency_ms, self.slow_latency_ms),
            "rate_limit.latency",
            latency_ms,
            store = store.as_str()
        );
    }
}
