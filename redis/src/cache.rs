//! Redis-backed shared cache for voucher metadata.
//!
//! Values are plain strings (JSON upstream) so they stay readable from Lua
//! scripts and `redis-cli`. TTLs are millisecond-precision (`PX`).

use crate::{connect, infra};
use flashsale_core::providers::SharedCache;
use flashsale_core::Result;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Redis implementation of the generic TTL'd cache.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisSharedCache;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = RedisSharedCache::new("redis://127.0.0.1:6379").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisSharedCache {
    conn_manager: ConnectionManager,
}

impl RedisSharedCache {
    /// Create a new Redis shared cache.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the connection cannot be
    /// established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            conn_manager: connect(redis_url).await?,
        })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn with_connection(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[allow(clippy::cast_possible_truncation)] // TTLs are bounded, far below u64::MAX ms
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| infra("GET", &e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let _: () = conn
            .pset_ex(key, value, ttl_ms)
            .await
            .map_err(|e| infra("PSETEX", &e))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;

        // SET NX PX replies OK on success, nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| infra("SET NX PX", &e))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await.map_err(|e| infra("DEL", &e))?;
        Ok(())
    }
}
