//! The asynchronous materialization worker.
//!
//! Consumes admitted purchases from the durable queue and turns each one
//! into durable state: an idempotent order insert, then a stock decrement
//! for newly inserted rows, acknowledged only after both. Delivery is at
//! least once, so every step tolerates redelivery; the loop never terminates
//! on a single entry's failure.

use crate::config::WorkerConfig;
use flashsale_core::providers::{OrderQueue, SystemOfRecord};
use flashsale_core::{OrderInsert, QueueEntry, Result};
use tokio_util::sync::CancellationToken;

/// Consumes the order stream and materializes orders into the system of
/// record.
///
/// Run one per consumer name; multiple workers in the same group share the
/// stream without duplicating work.
pub struct MaterializationWorker<S, Q> {
    store: S,
    queue: Q,
    config: WorkerConfig,
}

impl<S, Q> MaterializationWorker<S, Q>
where
    S: SystemOfRecord,
    Q: OrderQueue,
{
    /// Wire up a worker from its collaborators.
    pub const fn new(store: S, queue: Q, config: WorkerConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Run until the token is cancelled.
    ///
    /// Ensures the consumer group exists, recovers entries left pending by a
    /// previous incarnation of this consumer, then loops on blocking reads.
    /// Entries delivered but not yet acknowledged when cancellation lands
    /// are picked up by the next startup's recovery pass.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.ensure_group(&shutdown).await;
        if shutdown.is_cancelled() {
            return;
        }

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            "Materialization worker started"
        );

        // Entries delivered to this consumer before a crash are re-read from
        // group history and finished first.
        if let Err(e) = self.recover_pending().await {
            tracing::error!(error = %e, "Startup pending recovery failed");
        }

        let mut failures: usize = 0;
        loop {
            let polled = tokio::select! {
                () = shutdown.cancelled() => break,
                polled = self.poll_once() => polled,
            };

            match polled {
                Ok(()) => {
                    failures = 0;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Order materialization failed");

                    // The failed entry is still pending; sweep it (and any
                    // siblings) before reading new work.
                    if let Err(e) = self.recover_pending().await {
                        tracing::error!(error = %e, "Pending recovery failed");
                    }

                    let delay = self.config.failure_backoff.delay_for_attempt(failures);
                    failures = failures.saturating_add(1);
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!(consumer = %self.config.consumer, "Materialization worker stopped");
    }

    /// Create the consumer group, retrying until it succeeds or shutdown.
    ///
    /// The worker cannot do anything useful without the group, so this loops
    /// rather than giving up.
    async fn ensure_group(&self, shutdown: &CancellationToken) {
        let mut attempt: usize = 0;
        loop {
            match self
                .queue
                .create_group_if_absent(&self.config.stream, &self.config.group)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    let delay = self.config.failure_backoff.delay_for_attempt(attempt);
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "Consumer group creation failed, retrying"
                    );
                    tokio::select! {
                        () = shutdown.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One blocking read; empty reads are normal and return `Ok(())`.
    async fn poll_once(&self) -> Result<()> {
        let entry = self
            .queue
            .read_next(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer,
                self.config.block_timeout,
            )
            .await?;

        match entry {
            Some(entry) => self.materialize(&entry).await,
            None => Ok(()),
        }
    }

    /// Drain this consumer's delivered-but-unacknowledged entries.
    async fn recover_pending(&self) -> Result<()> {
        loop {
            let pending = self
                .queue
                .read_pending(&self.config.stream, &self.config.group, &self.config.consumer)
                .await?;

            if pending.is_empty() {
                return Ok(());
            }

            tracing::info!(count = pending.len(), "Recovering pending entries");
            for entry in &pending {
                self.materialize(entry).await?;
            }
        }
    }

    /// Persist one entry and acknowledge it.
    ///
    /// The order insert is keyed on the unique order id, so it doubles as
    /// the idempotency witness: the stock decrement runs only when the row
    /// is new, and a redelivered entry changes nothing.
    async fn materialize(&self, entry: &QueueEntry) -> Result<()> {
        let order = entry.order;

        let inserted = self
            .store
            .insert_order(&order.into_order(chrono::Utc::now()))
            .await?;
        match inserted {
            OrderInsert::AlreadyExists => {
                tracing::debug!(order_id = %order.order_id, "Order already persisted (redelivery)");
            }
            OrderInsert::Inserted => {
                // The shared store already admitted this purchase, so a
                // failed decrement means the durable stock diverged from the
                // shared-store counter. Alarm, but keep the order: admission
                // is the source of truth for who bought.
                let decremented = self.store.decrement_stock(order.voucher_id).await?;
                if !decremented {
                    tracing::error!(
                        voucher_id = %order.voucher_id,
                        order_id = %order.order_id,
                        consistency_alarm = true,
                        "Durable stock exhausted for an admitted purchase"
                    );
                }
            }
        }

        self.queue
            .acknowledge(&self.config.stream, &self.config.group, &entry.entry_id)
            .await?;

        tracing::debug!(
            order_id = %order.order_id,
            entry_id = %entry.entry_id,
            "Order materialized"
        );
        Ok(())
    }
}
