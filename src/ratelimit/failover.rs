//! Primary/secondary failover for rate limit stores.
//!
//! While the primary store works every call goes to it. The first
//! `check_limit` failure flips the wrapper to the secondary store, which is
//! served with a relaxed rule (`max_attempts × relaxation factor`) since it
//! usually starts with empty counters. After the health-check interval the
//! next `check_limit` probes the primary with a throwaway key and switches
//! back if the probe succeeds; a failed probe restarts the timer.
//!
//! ```text
//!                 check_limit error
//!   PrimaryActive ------------------> SecondaryActive --+
//!         ^                                 |           | probe failed
//!         +---------- probe ok -------------+ <---------+
//! ```
//!
//! The state is local to this instance. Separate processes sharing the same
//! backends decide independently whether the primary is healthy, and
//! concurrent requests may run overlapping probes before the state flips.
//!
//! Only `check_limit` fails over. `reset_limit` and `get_status` go to
//! whichever store is current and return its error as-is; their failures
//! are recorded as secondary-store latency.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::key::RateLimitKey;
use super::result::RateLimitResult;
use super::rule::RateLimitRule;
use super::store::RateLimitStore;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::metrics::{MetricsSink, StoreLabel};

/// Default wait between a failover and the next primary health check.
pub const HEALTH_CHECK_INTERVAL_SECS: i64 = 30;

/// Default multiplier for `max_attempts` on the secondary store.
pub const RELAXATION_FACTOR: u32 = 2;

/// Which store currently serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    PrimaryActive,
    SecondaryActive,
}

#[derive(Debug)]
struct FailoverState {
    primary_available: bool,
    failover_at: Option<DateTime<Utc>>,
}

/// A [`RateLimitStore`] that falls back to a secondary store when the primary fails.
pub struct FailoverRateLimitStore {
    primary: Arc<dyn RateLimitStore>,
    secondary: Arc<dyn RateLimitStore>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    health_check_interval: Duration,
    relaxation_factor: u32,
    state: Mutex<FailoverState>,
}

impl FailoverRateLimitStore {
    pub fn new(
        primary: Arc<dyn RateLimitStore>,
        secondary: Arc<dyn RateLimitStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            primary,
            secondary,
            metrics,
            clock: Arc::new(SystemClock),
            health_check_interval: Duration::seconds(HEALTH_CHECK_INTERVAL_SECS),
            relaxation_factor: RELAXATION_FACTOR,
            state: Mutex::new(FailoverState {
                primary_available: true,
                failover_at: None,
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_relaxation_factor(mut self, factor: u32) -> Self {
        self.relaxation_factor = factor.max(1);
        self
    }

    pub fn state(&self) -> StoreState {
        if self.state.lock().primary_available {
            StoreState::PrimaryActive
        } else {
            StoreState::SecondaryActive
        }
    }

    pub fn is_primary_available(&self) -> bool {
        self.state.lock().primary_available
    }

    /// When the current failover started or the last probe failed.
    pub fn failover_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().failover_at
    }

    fn health_check_due(&self) -> bool {
        let state = self.state.lock();
        if state.primary_available {
            return false;
        }
        state
            .failover_at
            .is_some_and(|at| self.clock.now() - at >= self.health_check_interval)
    }

    fn mark_primary_failed(&self) {
        let mut state = self.state.lock();
        state.primary_available = false;
        state.failover_at = Some(self.clock.now());
    }

    fn mark_primary_recovered(&self) {
        let mut state = self.state.lock();
        state.primary_available = true;
        state.failover_at = None;
    }

    fn relax(&self, rule: &RateLimitRule) -> RateLimitRule {
        rule.relaxed(self.relaxation_factor)
    }

    fn record_latency(&self, started: Instant, store: StoreLabel) {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_latency(latency_ms, store);
    }

    /// Probe the primary store with a disposable key.
    async fn run_health_check(&self) {
        let probe = RateLimitKey::compose("health_check", &Uuid::new_v4().simple().to_string())
            .and_then(|key| RateLimitRule::new("health_check", 1, 1).map(|rule| (key, rule)));
        let (key, rule) = match probe {
            Ok(probe) => probe,
            Err(e) => {
                warn!(error = %e, "Could not build health check probe");
                self.mark_primary_failed();
                return;
            }
        };

        let started = Instant::now();
        match self.primary.get_status(&key, &rule).await {
            Ok(_) => {
                self.record_latency(started, StoreLabel::Primary);
                self.mark_primary_recovered();
                info!("Primary rate limit store recovered");
            }
            Err(e) => {
                self.mark_primary_failed();
                debug!(error = %e, "Primary rate limit store still unavailable");
            }
        }
    }

    async fn check_with_primary(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        let started = Instant::now();
        let primary_error = match self.primary.check_limit(key, rule).await {
            Ok(result) => {
                self.record_latency(started, StoreLabel::Primary);
                return Ok(result);
            }
            Err(e) => e,
        };
        self.record_latency(started, StoreLabel::Primary);

        self.mark_primary_failed();
        warn!(key = %key.hashed(), error = %primary_error, "Primary rate limit store failed, failing over");

        match self.check_with_secondary(key, rule).await {
            Ok(result) => {
                self.metrics
                    .record_failure(key, rule, &primary_error.to_string(), true);
                Ok(result)
            }
            Err(secondary_error) => {
                self.metrics
                    .record_failure(key, rule, &secondary_error.to_string(), false);
                Err(secondary_error)
            }
        }
    }

    async fn check_with_secondary(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        let relaxed = self.relax(rule);
        let started = Instant::now();
        let result = self.secondary.check_limit(key, &relaxed).await;
        self.record_latency(started, StoreLabel::Secondary);
        result
    }
}

#[async_trait]
impl RateLimitStore for FailoverRateLimitStore {
    async fn check_limit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        // The state is read twice, under separate locks, because the probe
        // awaits in between. Concurrent callers may probe at the same time.
        if self.health_check_due() {
            self.run_health_check().await;
        }

        if self.is_primary_available() {
            self.check_with_primary(key, rule).await
        } else {
            self.check_with_secondary(key, rule).await
        }
    }

    async fn reset_limit(&self, key: &RateLimitKey) -> Result<()> {
        let started = Instant::now();
        let (result, store) = if self.is_primary_available() {
            (self.primary.reset_limit(key).await, StoreLabel::Primary)
        } else {
            (self.secondary.reset_limit(key).await, StoreLabel::Secondary)
        };

        match result {
            Ok(()) => {
                self.record_latency(started, store);
                Ok(())
            }
            Err(e) => {
                self.record_latency(started, StoreLabel::Secondary);
                Err(e)
            }
        }
    }

    async fn get_status(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        let started = Instant::now();
        let (result, store) = if self.is_primary_available() {
            (self.primary.get_status(key, rule).await, StoreLabel::Primary)
        } else {
            let relaxed = self.relax(rule);
            (self.secondary.get_status(key, &relaxed).await, StoreLabel::Secondary)
        };

        match result {
            Ok(status) => {
                self.record_latency(started, store);
                Ok(status)
            }
            Err(e) => {
                self.record_latency(started, StoreLabel::Secondary);
                Err(e)
            }
        }
    }
}
