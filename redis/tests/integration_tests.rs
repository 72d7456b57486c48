//! Integration tests for the Redis-backed stores against a real Redis
//! instance.
//!
//! These tests are marked as `#[ignore]` by default because they require
//! Redis running at `redis://127.0.0.1:6379`.
//!
//! To run explicitly:
//! ```bash
//! cargo test -p flashsale-redis --test integration_tests -- --ignored
//! ```
//!
//! # Panics
//!
//! These tests use `expect()` for setup failures, which is acceptable in
//! test code.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::cast_possible_truncation)]

use flashsale_core::providers::{
    AdmissionGate, DistributedLock, IdGenerator, OrderQueue, SharedCache,
};
use flashsale_core::{Admission, OrderId, PendingOrder, UserId, VoucherId};
use flashsale_redis::{
    RedisAdmissionGate, RedisDistributedLock, RedisOrderQueue, RedisSequence, RedisSharedCache,
};
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Unique suffix per test run so concurrent runs never share keys.
fn unique_suffix() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_lock_is_exclusive_until_released() {
    let lock = RedisDistributedLock::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let key = format!("lock:test:{}", unique_suffix());

    let lease = lock
        .try_acquire(&key, Duration::from_millis(100), Duration::from_secs(10))
        .await
        .expect("Acquire failed")
        .expect("First acquire should succeed");

    // A second caller cannot get the lock while the lease is held.
    let contender = lock
        .try_acquire(&key, Duration::from_millis(200), Duration::from_secs(10))
        .await
        .expect("Acquire failed");
    assert!(contender.is_none(), "Lock should be exclusive");

    lock.release(lease).await.expect("Release failed");

    let lease = lock
        .try_acquire(&key, Duration::from_millis(100), Duration::from_secs(10))
        .await
        .expect("Acquire failed")
        .expect("Acquire after release should succeed");
    lock.release(lease).await.expect("Release failed");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_lock_watchdog_extends_short_lease() {
    let lock = RedisDistributedLock::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let key = format!("lock:test:wd:{}", unique_suffix());

    let lease = lock
        .try_acquire(&key, Duration::from_millis(100), Duration::from_millis(600))
        .await
        .expect("Acquire failed")
        .expect("Acquire should succeed");

    // Outlive the initial lease; the watchdog should keep renewing it.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let contender = lock
        .try_acquire(&key, Duration::from_millis(100), Duration::from_secs(10))
        .await
        .expect("Acquire failed");
    assert!(contender.is_none(), "Watchdog should have renewed the lease");

    lock.release(lease).await.expect("Release failed");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_watchdog_unregisters_itself_when_lease_is_lost() {
    let lock = RedisDistributedLock::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let cache = RedisSharedCache::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let key = format!("lock:test:lost:{}", unique_suffix());

    let lease = lock
        .try_acquire(&key, Duration::from_millis(100), Duration::from_millis(600))
        .await
        .expect("Acquire failed")
        .expect("Acquire should succeed");
    assert_eq!(lock.active_watchdogs(), 1);

    // Simulate a lost lease: the next renewal finds the key gone and the
    // watchdog stops without release() ever being called.
    cache.delete(&key).await.expect("Delete failed");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while lock.active_watchdogs() != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Watchdog entry should be removed after the lease is lost"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Release after the lease was lost stays idempotent.
    lock.release(lease).await.expect("Release failed");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_admission_is_tri_state() {
    let gate = RedisAdmissionGate::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let voucher = VoucherId(unique_suffix());

    gate.prime_stock(voucher, 1).await.expect("Prime failed");

    let first = gate
        .try_admit(voucher, UserId(1), OrderId(100))
        .await
        .expect("Admit failed");
    assert_eq!(first, Admission::Admitted);

    // Same user again: rejected as a duplicate even though stock is gone.
    let duplicate = gate
        .try_admit(voucher, UserId(1), OrderId(101))
        .await
        .expect("Admit failed");
    assert_eq!(duplicate, Admission::DuplicateOrder);

    // Different user: stock is exhausted.
    let exhausted = gate
        .try_admit(voucher, UserId(2), OrderId(102))
        .await
        .expect("Admit failed");
    assert_eq!(exhausted, Admission::InsufficientStock);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_admission_on_unprimed_voucher_is_insufficient() {
    let gate = RedisAdmissionGate::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let voucher = VoucherId(unique_suffix() + 1);

    let outcome = gate
        .try_admit(voucher, UserId(1), OrderId(100))
        .await
        .expect("Admit failed");
    assert_eq!(outcome, Admission::InsufficientStock);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_queue_publish_read_acknowledge_lifecycle() {
    let queue = RedisOrderQueue::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let stream = format!("stream.test:{}", unique_suffix());
    let group = "orders";

    queue
        .create_group_if_absent(&stream, group)
        .await
        .expect("Group creation failed");
    // Second creation is a no-op, not an error.
    queue
        .create_group_if_absent(&stream, group)
        .await
        .expect("Group creation should be idempotent");

    let order = PendingOrder {
        order_id: OrderId(42),
        user_id: UserId(7),
        voucher_id: VoucherId(3),
    };
    queue
        .publish(&stream, &order)
        .await
        .expect("Publish failed");

    let entry = queue
        .read_next(&stream, group, "c1", Duration::from_secs(2))
        .await
        .expect("Read failed")
        .expect("Entry should be delivered");
    assert_eq!(entry.order, order);

    // Delivered but unacknowledged: visible to the pending recovery read.
    let pending = queue
        .read_pending(&stream, group, "c1")
        .await
        .expect("Pending read failed");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order, order);

    queue
        .acknowledge(&stream, group, &entry.entry_id)
        .await
        .expect("Acknowledge failed");

    let pending = queue
        .read_pending(&stream, group, "c1")
        .await
        .expect("Pending read failed");
    assert!(pending.is_empty(), "Acknowledged entry should not be pending");

    // Acknowledging again stays idempotent.
    queue
        .acknowledge(&stream, group, &entry.entry_id)
        .await
        .expect("Repeat acknowledge should succeed");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_queue_read_next_times_out_empty() {
    let queue = RedisOrderQueue::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let stream = format!("stream.test:empty:{}", unique_suffix());

    queue
        .create_group_if_absent(&stream, "orders")
        .await
        .expect("Group creation failed");

    let entry = queue
        .read_next(&stream, "orders", "c1", Duration::from_millis(200))
        .await
        .expect("Read failed");
    assert!(entry.is_none(), "Empty stream should time out to None");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_sequence_ids_are_unique_and_increasing() {
    let sequence = RedisSequence::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let scope = format!("test:{}", unique_suffix());

    let mut previous = 0;
    for _ in 0..100 {
        let id = sequence.next_id(&scope).await.expect("Next id failed");
        assert!(id > previous, "Ids must be strictly increasing");
        previous = id;
    }
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_cache_set_get_delete_and_nx() {
    let cache = RedisSharedCache::new(REDIS_URL)
        .await
        .expect("Failed to connect");
    let key = format!("cache:test:{}", unique_suffix());

    assert_eq!(cache.get(&key).await.expect("Get failed"), None);

    cache
        .set(&key, "hello", Duration::from_secs(30))
        .await
        .expect("Set failed");
    assert_eq!(
        cache.get(&key).await.expect("Get failed"),
        Some("hello".to_string())
    );

    // NX refuses to overwrite an existing key.
    let stored = cache
        .set_if_absent(&key, "other", Duration::from_secs(30))
        .await
        .expect("Set NX failed");
    assert!(!stored);
    assert_eq!(
        cache.get(&key).await.expect("Get failed"),
        Some("hello".to_string())
    );

    cache.delete(&key).await.expect("Delete failed");
    assert_eq!(cache.get(&key).await.expect("Get failed"), None);
}
