//! Durable order queue over Redis Streams.
//!
//! Delivery semantics: each entry goes to exactly one member of the consumer
//! group, at least once. Entries delivered but not acknowledged stay in the
//! consumer's pending list and are re-read from history (`XREADGROUP` with
//! id `0`) by the worker's recovery pass; `XACK` after successful
//! persistence removes them.

use crate::{connect, infra};
use flashsale_core::providers::OrderQueue;
use flashsale_core::{
    FlashSaleError, OrderId, PendingOrder, QueueEntry, Result, UserId, VoucherId,
};
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;

/// Batch size for pending-recovery reads.
const PENDING_BATCH: usize = 32;

/// Redis Streams implementation of the durable order queue.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisOrderQueue;
/// use flashsale_core::providers::OrderQueue;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = RedisOrderQueue::new("redis://127.0.0.1:6379").await?;
/// queue.create_group_if_absent("stream.orders", "orders").await?;
///
/// let entry = queue
///     .read_next("stream.orders", "orders", "worker-1", Duration::from_secs(2))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisOrderQueue {
    conn_manager: ConnectionManager,
}

impl RedisOrderQueue {
    /// Create a new queue client.
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

    /// Decode one stream record into a queue entry.
    fn decode(id: &StreamId) -> Result<QueueEntry> {
        let field = |name: &str| -> Result<i64> {
            let raw: String = id.get(name).ok_or_else(|| {
                FlashSaleError::Infrastructure(format!(
                    "stream entry {} is missing field {name}",
                    id.id
                ))
            })?;
            raw.parse().map_err(|_| {
                FlashSaleError::Infrastructure(format!(
                    "stream entry {} has non-numeric {name}: {raw}",
                    id.id
                ))
            })
        };

        Ok(QueueEntry {
            entry_id: id.id.clone(),
            order: PendingOrder {
                order_id: OrderId(field("orderId")?),
                user_id: UserId(field("userId")?),
                voucher_id: VoucherId(field("voucherId")?),
            },
        })
    }

    /// `XREADGROUP` from the given offset, decoding up to `count` entries.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        offset: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<QueueEntry>> {
        let mut conn = self.conn_manager.clone();

        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if let Some(block) = block {
            #[allow(clippy::cast_possible_truncation)] // block timeouts are a few seconds
            {
                options = options.block(block.as_millis() as usize);
            }
        }

        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[offset], &options)
            .await
            .map_err(|e| infra("XREADGROUP", &e))?;

        reply
            .keys
            .iter()
            .flat_map(|key| key.ids.iter())
            .map(Self::decode)
            .collect()
    }
}

impl OrderQueue for RedisOrderQueue {
    async fn create_group_if_absent(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        // MKSTREAM so group setup does not race the first publish; BUSYGROUP
        // means the group already exists and is not an error.
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(stream, group, "0").await;

        match created {
            Ok(()) => {
                tracing::info!(stream, group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(infra("XGROUP CREATE", &e)),
        }
    }

    async fn read_next(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<QueueEntry>> {
        let entries = self
            .read_group(stream, group, consumer, ">", 1, Some(block))
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Vec<QueueEntry>> {
        // Offset 0 re-reads this consumer's delivered-but-unacknowledged
        // entries from the beginning of the group's history.
        self.read_group(stream, group, consumer, "0", PENDING_BATCH, None)
            .await
    }

    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let acked: i64 = conn
            .xack(stream, group, &[entry_id])
            .await
            .map_err(|e| infra("XACK", &e))?;

        if acked == 0 {
            // Already acknowledged by an earlier recovery pass; harmless.
            tracing::debug!(stream, group, entry_id, "Entry was not pending");
        }
        Ok(())
    }

    async fn publish(&self, stream: &str, order: &PendingOrder) -> Result<String> {
        let mut conn = self.conn_manager.clone();

        let entry_id: String = conn
            .xadd(
                stream,
                "*",
                &[
                    ("orderId", order.order_id.0.to_string()),
                    ("userId", order.user_id.0.to_string()),
                    ("voucherId", order.voucher_id.0.to_string()),
                ],
            )
            .await
            .map_err(|e| infra("XADD", &e))?;

        tracing::debug!(
            stream,
            entry_id = %entry_id,
            order_id = %order.order_id,
            "Published admitted purchase"
        );
        Ok(entry_id)
    }
}
