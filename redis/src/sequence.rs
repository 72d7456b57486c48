//! Time-ordered 64-bit id generation.
//!
//! An id is `(seconds since the generator epoch) << 32 | daily counter`.
//! The timestamp half makes ids sort by creation time across processes; the
//! counter half comes from a per-scope, per-day `INCR` key, so concurrent
//! generators never collide and the counter resets each day instead of
//! growing without bound.

use crate::{connect, infra};
use chrono::Utc;
use flashsale_core::providers::IdGenerator;
use flashsale_core::{keys, FlashSaleError, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Generator epoch: 2022-01-01T00:00:00Z.
const SEQUENCE_EPOCH: i64 = 1_640_995_200;

/// Bits reserved for the daily counter.
const COUNT_BITS: u32 = 32;

/// Redis-backed time-ordered id generator.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisSequence;
/// use flashsale_core::providers::IdGenerator;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sequence = RedisSequence::new("redis://127.0.0.1:6379").await?;
/// let id = sequence.next_id("order").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisSequence {
    conn_manager: ConnectionManager,
    /// Highest timestamp handed out so far; ids never run backwards even if
    /// the wall clock does.
    last_seconds: Arc<AtomicI64>,
}

impl RedisSequence {
    /// Create a new id generator.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the connection cannot be
    /// established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            conn_manager: connect(redis_url).await?,
            last_seconds: Arc::new(AtomicI64::new(0)),
        })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn with_connection(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            last_seconds: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl IdGenerator for RedisSequence {
    async fn next_id(&self, scope: &str) -> Result<i64> {
        let now = Utc::now();
        let seconds = now.timestamp() - SEQUENCE_EPOCH;
        if seconds <= 0 {
            return Err(FlashSaleError::Infrastructure(format!(
                "system clock predates the sequence epoch: {now}"
            )));
        }

        // Clamp against the highest timestamp already used.
        let seconds = self
            .last_seconds
            .fetch_max(seconds, Ordering::Relaxed)
            .max(seconds);

        let day = now.format("%Y%m%d").to_string();
        let key = keys::sequence(scope, &day);

        let mut conn = self.conn_manager.clone();
        let count: i64 = conn.incr(&key, 1).await.map_err(|e| infra("INCR", &e))?;

        Ok((seconds << COUNT_BITS) | (count & 0xFFFF_FFFF))
    }
}
