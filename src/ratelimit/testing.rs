//! Test doubles shared by the store and limiter tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::key::RateLimitKey;
use super::result::RateLimitResult;
use super::rule::RateLimitRule;
use super::store::{CounterStore, RateLimitStore};
use crate::backend::MemoryBackend;
use crate::clock::Clock;
use crate::error::{Result, TollgateError};
use crate::metrics::{MetricsSink, StoreLabel};

/// An in-memory store that can be switched into a failing mode.
pub struct FlakyStore {
    name: &'static str,
    inner: CounterStore<MemoryBackend>,
    failing: AtomicBool,
    check_calls: AtomicUsize,
    status_calls: AtomicUsize,
    reset_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn named(name: &'static str, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            inner: CounterStore::with_clock(MemoryBackend::with_clock(clock.clone()), clock),
            failing: AtomicBool::new(false),
            check_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    fn guard(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TollgateError::Store(format!("{} store unavailable", self.name)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RateLimitStore for FlakyStore {
    async fn check_limit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.guard()?;
        self.inner.check_limit(key, rule).await
    }

    async fn reset_limit(&self, key: &RateLimitKey) -> Result<()> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.guard()?;
        self.inner.reset_limit(key).await
    }

    async fn get_status(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.guard()?;
        self.inner.get_status(key, rule).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Hit {
        key: String,
        allowed: bool,
        attempts: u64,
    },
    Block {
        key: String,
        attempts: u64,
        retry_after_secs: u64,
    },
    Failure {
        key: String,
        error: String,
        failed_over: bool,
    },
    Latency {
        store: StoreLabel,
    },
}

/// Sink that keeps every event in order.
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    pub fn failures(&self) -> Vec<MetricEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, MetricEvent::Failure { .. }))
            .collect()
    }

    pub fn latencies(&self) -> Vec<StoreLabel> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MetricEvent::Latency { store } => Some(store),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_hit(&self, key: &RateLimitKey, _: &RateLimitRule, allowed: bool, attempts: u64) {
        self.events.lock().push(MetricEvent::Hit {
            key: key.as_str().to_string(),
            allowed,
            attempts,
        });
    }

    fn record_block(&self, key: &RateLimitKey, _: &RateLimitRule, attempts: u64, retry_after_secs: u64) {
        self.events.lock().push(MetricEvent::Block {
            key: key.as_str().to_string(),
            attempts,
            retry_after_secs,
        });
    }

    fn record_failure(&self, key: &RateLimitKey, _: &RateLimitRule, error: &str, failed_over: bool) {
        self.events.lock().push(MetricEvent::Failure {
            key: key.as_str().to_string(),
            error: error.to_string(),
            failed_over,
        });
    }

    fn record_latency(&self, _: f64, store: StoreLabel) {
        self.events.lock().push(MetricEvent::Latency { store });
    }
}
