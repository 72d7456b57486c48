//! Collaborator traits for the admission and fulfillment pipeline.
//!
//! These are the only seams between the pipeline and the outside world: the
//! system of record, the durable queue transport, the fast shared store, the
//! distributed lock and the sequence generator. Implementations are injected
//! by explicit construction at process start; there is no ambient context.

use crate::error::Result;
use crate::state::{
    Admission, OrderInsert, PendingOrder, QueueEntry, UserId, Voucher, VoucherId, VoucherOrder,
};
use std::future::Future;
use std::time::Duration;

/// The durable relational store for vouchers and orders.
///
/// The synchronous admission path never calls this directly except through
/// the cache-through voucher loader; the stock column and the order table are
/// mutated only by the materialization worker.
pub trait SystemOfRecord: Send + Sync {
    /// Load a voucher by id, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn get_voucher(
        &self,
        voucher_id: VoucherId,
    ) -> impl Future<Output = Result<Option<Voucher>>> + Send;

    /// Conditionally decrement stock (`stock > 0`).
    ///
    /// Returns `false` when the predicate did not hold. The conditional
    /// predicate serializes concurrent workers: a failed decrement means
    /// another worker already won.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn decrement_stock(
        &self,
        voucher_id: VoucherId,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Insert an order row, keyed on its unique order id.
    ///
    /// A duplicate key on `order_id` is reported as
    /// [`OrderInsert::AlreadyExists`], which callers treat as success so that
    /// redelivery stays idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn insert_order(
        &self,
        order: &VoucherOrder,
    ) -> impl Future<Output = Result<OrderInsert>> + Send;
}

/// Durable consumer-group queue for admitted purchases.
///
/// Delivery contract: each published entry is delivered to exactly one
/// member of a consumer group, **at least once**. Entries delivered but not
/// acknowledged survive consumer crashes and are revisited through
/// [`read_pending`](Self::read_pending).
pub trait OrderQueue: Send + Sync {
    /// Create the consumer group if it does not exist yet.
    ///
    /// Idempotent: "group already exists" is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the transport is unreachable.
    fn create_group_if_absent(
        &self,
        stream: &str,
        group: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Blocking-read the next unconsumed entry for this consumer.
    ///
    /// Waits up to `block`; an empty read returns `Ok(None)` and is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the transport is unreachable or an entry is malformed.
    fn read_next(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> impl Future<Output = Result<Option<QueueEntry>>> + Send;

    /// Read entries already delivered to this consumer but never
    /// acknowledged, from the beginning of the group's history.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the transport is unreachable or an entry is malformed.
    fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> impl Future<Output = Result<Vec<QueueEntry>>> + Send;

    /// Acknowledge a delivered entry, removing it from the pending set.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the transport is unreachable.
    fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        entry_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Publish an admitted purchase, returning the transport entry id.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the transport is unreachable.
    fn publish(
        &self,
        stream: &str,
        order: &PendingOrder,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Generic TTL'd key/value access to the fast shared store.
///
/// Values are strings so they stay readable from Lua scripts and operator
/// tooling. The stock counter and buyer sets are *not* reachable through
/// this trait; they are mutated only by [`AdmissionGate::try_admit`].
pub trait SharedCache: Send + Sync {
    /// Get a value, `None` on miss.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Set a value with a TTL.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Set a value with a TTL only if the key is absent; `true` if written.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Delete a key. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// The atomic admission operation of the fast shared store.
///
/// One indivisible step performs the stock check, the per-user membership
/// check and both mutations relative to all concurrent invocations for the
/// same voucher. Store-side failures surface as infrastructure errors,
/// never as [`Admission::InsufficientStock`].
pub trait AdmissionGate: Send + Sync {
    /// Attempt to admit `(voucher, user)`, recording `order_id` on success.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store cannot execute the operation.
    fn try_admit(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
        order_id: crate::state::OrderId,
    ) -> impl Future<Output = Result<Admission>> + Send;

    /// Seed the cached stock counter and clear the buyer set for a voucher,
    /// called when a sale is published.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the store is unreachable.
    fn prime_stock(
        &self,
        voucher_id: VoucherId,
        stock: i64,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// A held lock lease, returned by [`DistributedLock::try_acquire`].
///
/// Carries the holder token so release never deletes another holder's lease
/// after this one expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// The locked resource key.
    pub key: String,
    /// Unique holder token for compare-and-delete release.
    pub token: String,
}

/// Lease-scoped, cross-process mutual exclusion on a named resource.
pub trait DistributedLock: Send + Sync {
    /// Block up to `wait` attempting to obtain the lease.
    ///
    /// Returns `Ok(None)` on wait timeout - callers treat that as "system
    /// busy", not as an error. The lease auto-expires after `lease` even if
    /// the holder crashes, so no key deadlocks permanently.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the lock store is unreachable.
    fn try_acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> impl Future<Output = Result<Option<LockLease>>> + Send;

    /// Release a held lease.
    ///
    /// Idempotent and safe to call after the lease already expired.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the lock store is unreachable.
    fn release(&self, lease: LockLease) -> impl Future<Output = Result<()>> + Send;
}

/// Globally unique, time-ordered 64-bit id generation.
///
/// Ids combine a coarse timestamp relative to a fixed epoch with a per-scope
/// monotonic counter: concurrent callers never collide and later time
/// windows sort after earlier ones, with no dedicated counter service.
pub trait IdGenerator: Send + Sync {
    /// Produce the next id for a scope (e.g. `"order"`).
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`](crate::FlashSaleError::Infrastructure)
    /// if the counter store is unreachable.
    fn next_id(&self, scope: &str) -> impl Future<Output = Result<i64>> + Send;
}
