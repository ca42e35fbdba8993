//! In-process counter backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::CounterBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TollgateError};

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl Counter {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Default time between sweeps of expired counters.
pub const DEFAULT_PURGE_INTERVAL_SECS: i64 = 60;

/// Counters held in a sharded concurrent map.
///
/// Each operation runs under the shard lock of its key, which makes
/// create-if-absent and increment atomic within the process. Expired
/// entries are treated as absent. They are swept from the map by the first
/// `create_if_absent` after each purge interval, so keys that are never
/// seen again do not pile up.
#[derive(Clone)]
pub struct MemoryBackend {
    counters: Arc<DashMap<String, Counter>>,
    clock: Arc<dyn Clock>,
    purge_interval: chrono::Duration,
    last_purge: Arc<Mutex<DateTime<Utc>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            counters: Arc::new(DashMap::new()),
            clock,
            purge_interval: chrono::Duration::seconds(DEFAULT_PURGE_INTERVAL_SECS),
            last_purge: Arc::new(Mutex::new(now)),
        }
    }

    pub fn with_purge_interval(mut self, interval: chrono::Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Number of stored counters, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop every expired counter. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        before.saturating_sub(self.counters.len())
    }

    /// Sweep expired counters if the purge interval has elapsed.
    ///
    /// Must not be called while holding a map entry: the sweep locks every shard.
    fn maybe_purge(&self, now: DateTime<Utc>) {
        // Another caller is already deciding; skip rather than wait.
        let Some(mut last_purge) = self.last_purge.try_lock() else {
            return;
        };
        if now - *last_purge < self.purge_interval {
            return;
        }
        *last_purge = now;
        drop(last_purge);

        let removed = self.purge_expired();
        if removed > 0 {
            debug!(removed, remaining = self.counters.len(), "Purged expired counters");
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn ttl_to_chrono(ttl: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(ttl)
        .map_err(|e| TollgateError::Store(format!("invalid counter ttl {:?}: {}", ttl, e)))
}

#[async_trait]
impl CounterBackend for MemoryBackend {
    async fn create_if_absent(&self, key: &str, initial: u64, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let fresh = Counter {
            value: initial,
            expires_at: Some(now + ttl_to_chrono(ttl)?),
        };

        let created = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(fresh);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                true
            }
        };

        trace!(key, created, "create_if_absent");
        self.maybe_purge(now);
        Ok(created)
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let now = self.clock.now();
        let mut counter = self.counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: None,
        });

        // A missing or expired key restarts at one without a TTL.
        if counter.is_expired(now) {
            *counter = Counter {
                value: 0,
                expires_at: None,
            };
        }
        counter.value += 1;
        Ok(counter.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = now + ttl_to_chrono(ttl)?;

        match self.counters.get_mut(key) {
            Some(mut counter) if !counter.is_expired(now) => {
                counter.expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<u64>> {
        let now = self.clock.now();
        Ok(self
            .counters
            .get(key)
            .filter(|counter| !counter.is_expired(now))
            .map(|counter| counter.value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.counters.remove(key);
        Ok(())
    }
}
