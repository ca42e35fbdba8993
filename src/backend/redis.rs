//! Redis-backed counter backend.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisResult};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::CounterBackend;
use crate::error::{Result, TollgateError};

/// Counters stored in Redis.
///
/// `create_if_absent` is `SET NX EX`, `increment` is `INCR`; both are atomic
/// on the server, so any number of processes can share the same instance.
/// Every call, including connecting, is bounded by the configured timeout.
pub struct RedisBackend {
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisBackend {
    /// Create a backend for `url`. No connection is made until first use.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            timeout,
            connection: Mutex::new(None),
        })
    }

    /// The per-call latency bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        debug!("Opening redis connection");
        let connection = self.bounded(ConnectionManager::new(self.client.clone())).await?;
        *slot = Some(connection.clone());
        Ok(connection)
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TollgateError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl CounterBackend for RedisBackend {
    async fn create_if_absent(&self, key: &str, initial: u64, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;

        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key)
            .arg(initial)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1));

        let reply: Option<String> = self.bounded(cmd.query_async(&mut conn)).await?;
        let created = reply.is_some();

        trace!(key, created, "create_if_absent");
        Ok(created)
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let value: u64 = self.bounded(conn.incr(key, 1u64)).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        let applied: bool = self.bounded(conn.expire(key, seconds)).await?;
        Ok(applied)
    }

    async fn read(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection().await?;
        let value: Option<u64> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = self.bounded(conn.del(key)).await?;
        Ok(())
    }
}
