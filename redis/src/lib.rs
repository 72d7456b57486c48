//! # Flashsale Redis
//!
//! Redis-backed implementations of the fast-shared-store collaborators from
//! `flashsale-core`:
//!
//! - [`RedisSharedCache`] - TTL'd key/value access for cached voucher
//!   metadata.
//! - [`RedisDistributedLock`] - lease-scoped per-voucher mutual exclusion
//!   (`SET NX PX` + compare-and-delete release, watchdog renewal).
//! - [`RedisAdmissionGate`] - the atomic admission Lua script: stock check,
//!   buyer-set membership check and both mutations in one indivisible step.
//! - [`RedisOrderQueue`] - durable consumer-group queue over Redis Streams
//!   with pending-entry recovery reads.
//! - [`RedisSequence`] - time-ordered 64-bit order ids from a coarse
//!   timestamp and a daily `INCR` counter.
//!
//! All stores share the same shape: a cloned [`ConnectionManager`] per call
//! for pooling, errors mapped into `FlashSaleError::Infrastructure`.
//!
//! [`ConnectionManager`]: redis::aio::ConnectionManager

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod cache;
pub mod lock;
pub mod queue;
pub mod sequence;

pub use admission::RedisAdmissionGate;
pub use cache::RedisSharedCache;
pub use lock::RedisDistributedLock;
pub use queue::RedisOrderQueue;
pub use sequence::RedisSequence;

use flashsale_core::{FlashSaleError, Result};
use redis::aio::ConnectionManager;
use redis::Client;

/// Open a connection manager for a Redis URL.
pub(crate) async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url).map_err(|e| {
        FlashSaleError::Infrastructure(format!("Failed to create Redis client: {e}"))
    })?;

    ConnectionManager::new(client).await.map_err(|e| {
        FlashSaleError::Infrastructure(format!("Failed to create Redis connection manager: {e}"))
    })
}

/// Map a Redis error into the crate taxonomy with an operation label.
pub(crate) fn infra(op: &str, e: &redis::RedisError) -> FlashSaleError {
    FlashSaleError::Infrastructure(format!("{op}: {e}"))
}
