//! The synchronous admission path.
//!
//! `purchase` is the request-facing entry point of the pipeline. It decides
//! admission entirely against the fast shared store and hands the durable
//! write off to the queue; the system of record is touched only through the
//! cache-through voucher loader. A request is accepted the moment its
//! pending order is enqueued.
//!
//! Error discipline at this boundary: every infrastructure failure is logged
//! with its cause and surfaced to the caller as `SystemBusy`. Callers see
//! only outcomes they can act on.

use crate::config::AdmissionConfig;
use crate::voucher_cache::VoucherCache;
use chrono::Utc;
use flashsale_core::providers::{
    AdmissionGate, DistributedLock, IdGenerator, OrderQueue, SharedCache, SystemOfRecord,
};
use flashsale_core::retry::retry_with_backoff;
use flashsale_core::{
    keys, Admission, FlashSaleError, OrderId, PendingOrder, Result, UserId, Voucher, VoucherId,
};

/// Scope under which order ids are generated.
const ORDER_ID_SCOPE: &str = "order";

/// The admission controller: per-voucher lock, window check, atomic
/// admission, enqueue.
///
/// Generic over the collaborator traits so tests run the whole path
/// against in-memory mocks. Construct one per process and share it behind an
/// `Arc`; all methods take `&self`.
pub struct AdmissionController<L, C, S, G, Q, I> {
    lock: L,
    gate: G,
    queue: Q,
    ids: I,
    vouchers: VoucherCache<C, S>,
    config: AdmissionConfig,
}

impl<L, C, S, G, Q, I> AdmissionController<L, C, S, G, Q, I>
where
    L: DistributedLock,
    C: SharedCache,
    S: SystemOfRecord,
    G: AdmissionGate,
    Q: OrderQueue,
    I: IdGenerator,
{
    /// Wire up a controller from its collaborators.
    pub fn new(
        lock: L,
        cache: C,
        store: S,
        gate: G,
        queue: Q,
        ids: I,
        config: AdmissionConfig,
    ) -> Self {
        let vouchers = VoucherCache::new(cache, store, config.cache_ttl, config.null_cache_ttl);
        Self {
            lock,
            gate,
            queue,
            ids,
            vouchers,
            config,
        }
    }

    /// Attempt to purchase one unit of a voucher for a user.
    ///
    /// On success the purchase is admitted and durably enqueued; the
    /// returned id identifies the order the materialization worker will
    /// persist.
    ///
    /// # Errors
    ///
    /// - [`FlashSaleError::SystemBusy`] - lock contention, wait timeout, or
    ///   any infrastructure failure (logged here with its cause).
    /// - [`FlashSaleError::VoucherNotFound`] - no such voucher.
    /// - [`FlashSaleError::NotStarted`] / [`FlashSaleError::Ended`] - outside
    ///   the sale window.
    /// - [`FlashSaleError::InsufficientStock`] - stock exhausted.
    /// - [`FlashSaleError::DuplicateOrder`] - this user already purchased.
    pub async fn purchase(&self, voucher_id: VoucherId, user_id: UserId) -> Result<OrderId> {
        match self.purchase_inner(voucher_id, user_id).await {
            Err(FlashSaleError::Infrastructure(cause)) => {
                tracing::error!(
                    voucher_id = %voucher_id,
                    user_id = %user_id,
                    cause,
                    "Purchase failed on infrastructure"
                );
                Err(FlashSaleError::SystemBusy)
            }
            other => other,
        }
    }

    /// Publish a sale: seed the shared-store stock counter, clear any
    /// previous buyer state and drop the cached voucher entry.
    ///
    /// Call after the voucher row exists in the system of record.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] when the shared store is
    /// unreachable.
    pub async fn open_sale(&self, voucher: &Voucher) -> Result<()> {
        self.gate.prime_stock(voucher.voucher_id, voucher.stock).await?;
        self.vouchers.invalidate(voucher.voucher_id).await?;
        tracing::info!(
            voucher_id = %voucher.voucher_id,
            stock = voucher.stock,
            "Sale opened"
        );
        Ok(())
    }

    /// The lock-scoped body of [`purchase`](Self::purchase).
    async fn purchase_inner(&self, voucher_id: VoucherId, user_id: UserId) -> Result<OrderId> {
        let lock_key = keys::seckill_lock(voucher_id);
        let Some(lease) = self
            .lock
            .try_acquire(&lock_key, self.config.lock_wait, self.config.lock_lease)
            .await?
        else {
            tracing::debug!(voucher_id = %voucher_id, user_id = %user_id, "Lock wait timed out");
            return Err(FlashSaleError::SystemBusy);
        };

        let result = self.admit(voucher_id, user_id).await;

        // The outcome is already decided; a failed release only delays the
        // next holder until the lease expires.
        if let Err(e) = self.lock.release(lease).await {
            tracing::warn!(voucher_id = %voucher_id, error = %e, "Lock release failed");
        }

        result
    }

    /// Window check, admission and enqueue, under the per-voucher lock.
    async fn admit(&self, voucher_id: VoucherId, user_id: UserId) -> Result<OrderId> {
        let voucher = self.vouchers.load(voucher_id).await?;

        let now = Utc::now();
        if now < voucher.begin_time {
            return Err(FlashSaleError::NotStarted);
        }
        if now > voucher.end_time {
            return Err(FlashSaleError::Ended);
        }

        // The id is minted before admission so the script records it and the
        // queue entry carries it; an id burned on a rejected attempt is fine,
        // ids only need to be unique and time-ordered.
        let order_id = OrderId(self.ids.next_id(ORDER_ID_SCOPE).await?);

        match self.gate.try_admit(voucher_id, user_id, order_id).await? {
            Admission::InsufficientStock => Err(FlashSaleError::InsufficientStock),
            Admission::DuplicateOrder => Err(FlashSaleError::DuplicateOrder),
            Admission::Admitted => {
                let pending = PendingOrder {
                    order_id,
                    user_id,
                    voucher_id,
                };

                // Admission already happened in the shared store; losing the
                // enqueue here would strand it. Retry before giving up.
                let entry_id = retry_with_backoff(&self.config.publish_retry, || {
                    self.queue.publish(&self.config.stream, &pending)
                })
                .await?;

                tracing::info!(
                    voucher_id = %voucher_id,
                    user_id = %user_id,
                    order_id = %order_id,
                    entry_id = %entry_id,
                    "Purchase admitted and enqueued"
                );
                Ok(order_id)
            }
        }
    }
}
