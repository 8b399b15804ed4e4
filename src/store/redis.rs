//! Redis store backend
//!
//! Pooled connections via `deadpool-redis`. Every command is bounded by the
//! configured socket timeout; pool waits and connection creation by the
//! connect timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Manager, Pool, Runtime};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, InfoDict, IntoConnectionInfo, Script};

use super::{StoreBackend, StoreError, StoreResult, StoreStats};
use crate::config::RedisSettings;

/// INCRBY plus EXPIRE-if-no-TTL as one atomic round trip.
///
/// The expiry is only applied while the key has none, so increments inside a
/// window never push its end further out.
static INCREMENT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local current = redis.call('INCRBY', KEYS[1], ARGV[1])
if redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return current
"#,
    )
});

/// Redis backend over a connection pool
pub struct RedisBackend {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisBackend {
    /// Build the pool; no connection is opened until first use
    pub fn new(settings: &RedisSettings) -> StoreResult<Self> {
        let mut info = settings.url.as_str().into_connection_info()?;
        if let Some(password) = &settings.password {
            info.redis.password = Some(password.clone());
        }
        info.redis.db = settings.db;

        let manager = Manager::new(info)?;
        let pool = Pool::builder(manager)
            .max_size(settings.max_connections)
            .wait_timeout(Some(settings.connect_timeout))
            .create_timeout(Some(settings.connect_timeout))
            .recycle_timeout(Some(settings.socket_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Ok(Self {
            pool,
            command_timeout: settings.socket_timeout,
        })
    }

    async fn conn(&self) -> StoreResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Run one command future under the command timeout
    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = self.timed(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        self.timed(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        match ttl_seconds {
            Some(ttl) => self.timed(conn.set_ex(key, value, ttl)).await,
            None => self.timed(conn.set(key, value)).await,
        }
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        self.timed(conn.del(keys)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.timed(conn.exists(key)).await
    }

    async fn increment(
        &self,
        key: &str,
        amount: i64,
        ttl_seconds: Option<u64>,
    ) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        match ttl_seconds {
            Some(ttl) => {
                let mut invocation = INCREMENT_SCRIPT.prepare_invoke();
                invocation.key(key).arg(amount).arg(ttl);
                self.timed(invocation.invoke_async(&mut conn)).await
            }
            None => self.timed(conn.incr(key, amount)).await,
        }
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.timed(conn.expire(key, seconds as i64)).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        self.timed(conn.ttl(key)).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let mut conn = self.conn().await?;
        self.timed(
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn),
        )
        .await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let mut conn = self.conn().await?;
        let info: InfoDict = self.timed(redis::cmd("INFO").query_async(&mut conn)).await?;
        let total_keys: u64 = self.timed(redis::cmd("DBSIZE").query_async(&mut conn)).await?;

        let hits: u64 = info.get("keyspace_hits").unwrap_or(0);
        let misses: u64 = info.get("keyspace_misses").unwrap_or(0);

        Ok(StoreStats {
            total_keys,
            keyspace_hits: hits,
            keyspace_misses: misses,
            hit_rate: StoreStats::hit_rate(hits, misses),
            memory_used: info.get("used_memory_human"),
            connected_clients: info.get("connected_clients"),
        })
    }

    async fn close(&self) {
        self.pool.close();
    }
}
