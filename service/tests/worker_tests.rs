//! Integration tests for the materialization worker, run against the
//! in-memory mocks.
//!
//! The properties under test: every enqueued admission becomes exactly one
//! persisted order, redelivery never duplicates rows, entries left pending
//! by a crashed consumer are recovered on the next startup, the loop
//! survives injected persistence failures, and cancellation stops the
//! worker promptly.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use chrono::{Duration as ChronoDuration, Utc};
use flashsale_core::providers::OrderQueue;
use flashsale_core::retry::RetryPolicy;
use flashsale_core::{OrderId, PendingOrder, UserId, Voucher, VoucherId};
use flashsale_service::mocks::{MockOrderQueue, MockSystemOfRecord};
use flashsale_service::{MaterializationWorker, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const STREAM: &str = "stream.orders";
const GROUP: &str = "orders";
const CONSUMER: &str = "c1";

fn worker_config() -> WorkerConfig {
    WorkerConfig::new(CONSUMER)
        .with_block_timeout(Duration::from_millis(50))
        .with_failure_backoff(
            RetryPolicy::builder()
                .initial_delay(Duration::from_millis(5))
                .max_delay(Duration::from_millis(50))
                .build(),
        )
}

fn open_voucher(id: i64, stock: i64) -> Voucher {
    let now = Utc::now();
    Voucher {
        voucher_id: VoucherId(id),
        stock,
        begin_time: now - ChronoDuration::hours(1),
        end_time: now + ChronoDuration::hours(1),
    }
}

fn pending(order_id: i64, user_id: i64, voucher_id: i64) -> PendingOrder {
    PendingOrder {
        order_id: OrderId(order_id),
        user_id: UserId(user_id),
        voucher_id: VoucherId(voucher_id),
    }
}

/// Spawn a worker over shared mock handles; returns the cancellation token
/// and the join handle.
fn spawn_worker(
    store: MockSystemOfRecord,
    queue: MockOrderQueue,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let worker = Arc::new(MaterializationWorker::new(store, queue, worker_config()));
    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move { worker.run(run_token).await });
    (token, handle)
}

/// Poll a condition until it holds or a 2s deadline expires.
async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_enqueued_orders_are_persisted_and_acknowledged() {
    let store = MockSystemOfRecord::new();
    let queue = MockOrderQueue::new();
    store.insert_voucher(open_voucher(1, 10));

    queue
        .create_group_if_absent(STREAM, GROUP)
        .await
        .expect("group creation failed");
    for i in 1..=3 {
        queue
            .publish(STREAM, &pending(i, i, 1))
            .await
            .expect("publish failed");
    }

    let (token, handle) = spawn_worker(store.clone(), queue.clone());
    wait_until(|| store.orders().len() == 3, "3 persisted orders").await;
    token.cancel();
    handle.await.expect("worker task panicked");

    assert_eq!(store.stock_of(VoucherId(1)), Some(7));
    let pending_entries = queue
        .read_pending(STREAM, GROUP, CONSUMER)
        .await
        .expect("pending read failed");
    assert!(pending_entries.is_empty(), "all entries must be acked");
}

#[tokio::test]
async fn test_redelivery_never_duplicates_rows() {
    let store = MockSystemOfRecord::new();
    let queue = MockOrderQueue::new();
    store.insert_voucher(open_voucher(1, 10));

    queue
        .create_group_if_absent(STREAM, GROUP)
        .await
        .expect("group creation failed");

    // The same admitted purchase lands on the stream twice.
    let order = pending(42, 7, 1);
    queue.publish(STREAM, &order).await.expect("publish failed");
    queue.publish(STREAM, &order).await.expect("publish failed");

    let (token, handle) = spawn_worker(store.clone(), queue.clone());
    wait_until(
        || queue.delivered(STREAM, GROUP) == 2 && queue.pending_len(STREAM, GROUP) == 0,
        "both deliveries acknowledged",
    )
    .await;
    token.cancel();
    handle.await.expect("worker task panicked");

    // One row and one stock decrement, despite two deliveries.
    assert_eq!(store.orders().len(), 1);
    assert_eq!(store.orders()[0].order_id, OrderId(42));
    assert_eq!(store.stock_of(VoucherId(1)), Some(9));
}

#[tokio::test]
async fn test_pending_entries_are_recovered_on_startup() {
    let store = MockSystemOfRecord::new();
    let queue = MockOrderQueue::new();
    store.insert_voucher(open_voucher(1, 10));

    queue
        .create_group_if_absent(STREAM, GROUP)
        .await
        .expect("group creation failed");
    queue
        .publish(STREAM, &pending(42, 7, 1))
        .await
        .expect("publish failed");

    // A previous incarnation of this consumer read the entry and crashed
    // before acknowledging it.
    let delivered = queue
        .read_next(STREAM, GROUP, CONSUMER, Duration::from_millis(50))
        .await
        .expect("read failed")
        .expect("entry should be delivered");
    assert_eq!(delivered.order.order_id, OrderId(42));
    assert!(store.orders().is_empty());

    let (token, handle) = spawn_worker(store.clone(), queue.clone());
    wait_until(|| store.orders().len() == 1, "recovered order").await;
    token.cancel();
    handle.await.expect("worker task panicked");

    let pending_entries = queue
        .read_pending(STREAM, GROUP, CONSUMER)
        .await
        .expect("pending read failed");
    assert!(pending_entries.is_empty());
}

#[tokio::test]
async fn test_loop_survives_injected_insert_failure() {
    let store = MockSystemOfRecord::new();
    let queue = MockOrderQueue::new();
    store.insert_voucher(open_voucher(1, 10));

    queue
        .create_group_if_absent(STREAM, GROUP)
        .await
        .expect("group creation failed");
    queue
        .publish(STREAM, &pending(42, 7, 1))
        .await
        .expect("publish failed");

    // First insert attempt fails; recovery must finish the entry.
    store.fail_next_inserts(1);

    let (token, handle) = spawn_worker(store.clone(), queue.clone());
    wait_until(
        || store.orders().len() == 1 && queue.pending_len(STREAM, GROUP) == 0,
        "order persisted after failure",
    )
    .await;

    // The retried entry decremented stock exactly once.
    assert_eq!(store.stock_of(VoucherId(1)), Some(9));

    // The loop is still alive and consumes new work.
    queue
        .publish(STREAM, &pending(43, 8, 1))
        .await
        .expect("publish failed");
    wait_until(
        || store.orders().len() == 2 && queue.pending_len(STREAM, GROUP) == 0,
        "second order persisted",
    )
    .await;

    token.cancel();
    handle.await.expect("worker task panicked");

    assert_eq!(store.stock_of(VoucherId(1)), Some(8));
}

#[tokio::test]
async fn test_durable_stock_exhaustion_still_persists_order() {
    let store = MockSystemOfRecord::new();
    let queue = MockOrderQueue::new();

    // Durable stock already at zero for an admitted purchase: the worker
    // alarms but the order row still lands.
    store.insert_voucher(open_voucher(1, 0));

    queue
        .create_group_if_absent(STREAM, GROUP)
        .await
        .expect("group creation failed");
    queue
        .publish(STREAM, &pending(42, 7, 1))
        .await
        .expect("publish failed");

    let (token, handle) = spawn_worker(store.clone(), queue.clone());
    wait_until(|| store.orders().len() == 1, "order persisted").await;
    token.cancel();
    handle.await.expect("worker task panicked");

    assert_eq!(store.stock_of(VoucherId(1)), Some(0));
}

#[tokio::test]
async fn test_cancellation_stops_the_worker_promptly() {
    let store = MockSystemOfRecord::new();
    let queue = MockOrderQueue::new();

    let (token, handle) = spawn_worker(store, queue);
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop after cancellation")
        .expect("worker task panicked");
}
