//! Rate limit store trait and the direct, backend-bound implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::key::RateLimitKey;
use super::result::RateLimitResult;
use super::rule::RateLimitRule;
use crate::backend::CounterBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Check-and-increment and read-only status over a counter store.
///
/// Implemented by [`CounterStore`] and by the failover wrapper, so stores
/// compose freely (a wrapper can wrap another wrapper).
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one attempt against `key` and decide whether it is allowed.
    async fn check_limit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult>;

    /// Forget every attempt recorded for `key`.
    async fn reset_limit(&self, key: &RateLimitKey) -> Result<()>;

    /// Inspect `key` without counting an attempt.
    async fn get_status(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult>;
}

#[async_trait]
impl<S: RateLimitStore + ?Sized> RateLimitStore for Arc<S> {
    async fn check_limit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        (**self).check_limit(key, rule).await
    }

    async fn reset_limit(&self, key: &RateLimitKey) -> Result<()> {
        (**self).reset_limit(key).await
    }

    async fn get_status(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        (**self).get_status(key, rule).await
    }
}

/// Fixed-window counters on a [`CounterBackend`].
///
/// The first attempt in a window creates the counter with a TTL of the
/// rule's decay window; later attempts increment it until it expires.
///
/// `reset_at` is always `now + decay`, not the counter's real expiry, so
/// the quoted reset time can be later than the moment the counter
/// actually disappears.
pub struct CounterStore<B: CounterBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
}

impl<B: CounterBackend> CounterStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: B, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: CounterBackend> RateLimitStore for CounterStore<B> {
    async fn check_limit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        let ttl = Duration::from_secs(rule.decay_seconds());
        let created = self.backend.create_if_absent(key.as_str(), 0, ttl).await?;
        let attempts = self.backend.increment(key.as_str()).await?;

        // The counter expired between the two calls and INCR recreated it
        // without a TTL. Without this it would never reset.
        if !created && attempts == 1 {
            debug!(key = %key, "Restoring counter ttl");
            self.backend.expire(key.as_str(), ttl).await?;
        }

        let reset_at = self.clock.now() + rule.decay();
        let max_attempts = u64::from(rule.max_attempts());

        trace!(key = %key, attempts, max_attempts, "Checked rate limit");

        // The attempt that reaches the limit is still allowed.
        if attempts <= max_attempts {
            Ok(RateLimitResult::allowed(attempts, max_attempts - attempts, reset_at))
        } else {
            Ok(RateLimitResult::blocked(attempts, reset_at))
        }
    }

    async fn reset_limit(&self, key: &RateLimitKey) -> Result<()> {
        self.backend.delete(key.as_str()).await
    }

    async fn get_status(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        let attempts = self.backend.read(key.as_str()).await?.unwrap_or(0);

        let reset_at = self.clock.now() + rule.decay();
        let max_attempts = u64::from(rule.max_attempts());

        // Unlike check_limit, a count equal to the limit is already exhausted.
        if attempts < max_attempts {
            Ok(RateLimitResult::allowed(attempts, max_attempts - attempts, reset_at))
        } else {
            Ok(RateLimitResult::blocked(attempts, reset_at))
        }
    }
}
