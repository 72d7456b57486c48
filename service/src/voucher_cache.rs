//! Cache-through voucher loader.
//!
//! Voucher metadata is read-heavy and nearly immutable during a sale, so the
//! hot path reads it from the shared cache and only falls through to the
//! system of record on a miss. Absent vouchers are cached as an empty-string
//! sentinel with a short TTL so a storm of requests for a nonexistent id
//! cannot hammer the database.

use flashsale_core::providers::{SharedCache, SystemOfRecord};
use flashsale_core::{keys, FlashSaleError, Result, Voucher, VoucherId};
use std::time::Duration;

/// Sentinel value cached for vouchers that do not exist.
const NULL_SENTINEL: &str = "";

/// Cache-through loader for voucher metadata.
pub struct VoucherCache<C, S> {
    cache: C,
    store: S,
    cache_ttl: Duration,
    null_cache_ttl: Duration,
}

impl<C, S> VoucherCache<C, S>
where
    C: SharedCache,
    S: SystemOfRecord,
{
    /// Create a loader over a cache and a system of record.
    pub const fn new(cache: C, store: S, cache_ttl: Duration, null_cache_ttl: Duration) -> Self {
        Self {
            cache,
            store,
            cache_ttl,
            null_cache_ttl,
        }
    }

    /// Load a voucher, serving from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::VoucherNotFound`] when the voucher does not
    /// exist (cached as a sentinel afterwards), or
    /// [`FlashSaleError::Infrastructure`] when either store is unreachable.
    pub async fn load(&self, voucher_id: VoucherId) -> Result<Voucher> {
        let key = keys::voucher_cache(voucher_id);

        if let Some(raw) = self.cache.get(&key).await? {
            if raw == NULL_SENTINEL {
                return Err(FlashSaleError::VoucherNotFound);
            }
            match serde_json::from_str(&raw) {
                Ok(voucher) => return Ok(voucher),
                Err(e) => {
                    // Corrupt entry: fall through and rebuild it from the
                    // system of record.
                    tracing::warn!(voucher_id = %voucher_id, error = %e, "Corrupt cached voucher");
                }
            }
        }

        match self.store.get_voucher(voucher_id).await? {
            Some(voucher) => {
                let json = serde_json::to_string(&voucher).map_err(|e| {
                    FlashSaleError::Infrastructure(format!("voucher serialization: {e}"))
                })?;
                self.cache.set(&key, &json, self.cache_ttl).await?;
                Ok(voucher)
            }
            None => {
                self.cache
                    .set(&key, NULL_SENTINEL, self.null_cache_ttl)
                    .await?;
                Err(FlashSaleError::VoucherNotFound)
            }
        }
    }

    /// Drop the cached entry for a voucher, forcing the next load to hit the
    /// system of record.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] when the cache is
    /// unreachable.
    pub async fn invalidate(&self, voucher_id: VoucherId) -> Result<()> {
        self.cache.delete(&keys::voucher_cache(voucher_id)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockSharedCache, MockSystemOfRecord};
    use chrono::{Duration as ChronoDuration, Utc};

    fn open_voucher(id: i64, stock: i64) -> Voucher {
        let now = Utc::now();
        Voucher {
            voucher_id: VoucherId(id),
            stock,
            begin_time: now - ChronoDuration::hours(1),
            end_time: now + ChronoDuration::hours(1),
        }
    }

    fn loader() -> VoucherCache<MockSharedCache, MockSystemOfRecord> {
        VoucherCache::new(
            MockSharedCache::new(),
            MockSystemOfRecord::new(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn loads_through_and_caches() {
        let loader = loader();
        loader.store.insert_voucher(open_voucher(7, 100));

        let voucher = loader.load(VoucherId(7)).await.unwrap();
        assert_eq!(voucher.voucher_id, VoucherId(7));

        // Second load is served from cache.
        let cached = loader.load(VoucherId(7)).await.unwrap();
        assert_eq!(cached, voucher);
        assert_eq!(loader.store.get_voucher_calls(), 1);
    }

    #[tokio::test]
    async fn absent_voucher_is_sentinel_cached() {
        let loader = loader();

        let err = loader.load(VoucherId(404)).await.unwrap_err();
        assert_eq!(err, FlashSaleError::VoucherNotFound);

        // The sentinel absorbs the second lookup without a store hit.
        let err = loader.load(VoucherId(404)).await.unwrap_err();
        assert_eq!(err, FlashSaleError::VoucherNotFound);
        assert_eq!(loader.store.get_voucher_calls(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let loader = loader();
        loader.store.insert_voucher(open_voucher(7, 100));

        loader.load(VoucherId(7)).await.unwrap();
        loader.invalidate(VoucherId(7)).await.unwrap();
        loader.load(VoucherId(7)).await.unwrap();

        assert_eq!(loader.store.get_voucher_calls(), 2);
    }
}
