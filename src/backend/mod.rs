//! Counter backends.
//!
//! A backend is a key/value store of integer counters with TTL support.
//! Atomicity of each operation is the backend's responsibility, so several
//! processes can share one backend without application-level locks.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::{MemoryBackend, DEFAULT_PURGE_INTERVAL_SECS};
pub use self::redis::RedisBackend;

/// Atomic counter operations used by the rate limit store.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Create `key` with `initial` and a TTL unless it already exists.
    ///
    /// Returns `true` when this call created the counter.
    async fn create_if_absent(&self, key: &str, initial: u64, ttl: Duration) -> Result<bool>;

    /// Increment `key` by one and return the new value.
    async fn increment(&self, key: &str) -> Result<u64>;

    /// Set the TTL of an existing `key`. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Current value of `key`, or `None` if it does not exist.
    async fn read(&self, key: &str) -> Result<Option<u64>>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
