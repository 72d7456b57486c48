//! In-memory consumer-group queue with at-least-once delivery.

use super::guard;
use flashsale_core::providers::OrderQueue;
use flashsale_core::{FlashSaleError, PendingOrder, QueueEntry, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct GroupState {
    /// Index of the next undelivered entry.
    cursor: usize,
    /// Delivered but unacknowledged: entry id -> (consumer, payload).
    pending: BTreeMap<String, (String, PendingOrder)>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<(String, PendingOrder)>,
    groups: HashMap<String, GroupState>,
}

/// Mock durable queue modelling delivery cursors, pending sets and acks.
///
/// `fail_next_publishes` injects transient publish failures so tests can
/// drive the controller's enqueue retry path.
#[derive(Clone, Default)]
pub struct MockOrderQueue {
    streams: Arc<Mutex<HashMap<String, StreamState>>>,
    next_seq: Arc<AtomicUsize>,
    fail_next_publishes: Arc<AtomicUsize>,
    published: Arc<Notify>,
}

impl MockOrderQueue {
    /// Create an empty mock queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail with an infrastructure error.
    pub fn fail_next_publishes(&self, n: usize) {
        self.fail_next_publishes.store(n, Ordering::SeqCst);
    }

    /// Total entries ever published to a stream.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn len(&self, stream: &str) -> usize {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }

    /// Whether a stream has no entries.
    #[must_use]
    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    /// Entries delivered to a group so far.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn delivered(&self, stream: &str, group: &str) -> usize {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.cursor)
    }

    /// Delivered-but-unacknowledged entries across all consumers.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn pending_len(&self, stream: &str, group: &str) -> usize {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Take the next undelivered entry for a consumer, if one exists.
    fn try_take(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Option<QueueEntry>> {
        let mut streams = guard(&self.streams)?;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        if group_state.cursor >= state.entries.len() {
            return Ok(None);
        }

        let (entry_id, order) = state.entries[group_state.cursor].clone();
        group_state.cursor += 1;
        group_state
            .pending
            .insert(entry_id.clone(), (consumer.to_string(), order));

        Ok(Some(QueueEntry {
            entry_id,
            order,
        }))
    }
}

fn no_group(stream: &str, group: &str) -> FlashSaleError {
    FlashSaleError::Infrastructure(format!("no such consumer group: {stream}/{group}"))
}

impl OrderQueue for MockOrderQueue {
    async fn create_group_if_absent(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = guard(&self.streams)?;
        streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn read_next(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<QueueEntry>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            if let Some(entry) = self.try_take(stream, group, consumer)? {
                return Ok(Some(entry));
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // Wake on publish or give up at the deadline.
            let notified = self.published.notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(self.try_take(stream, group, consumer)?);
            }
        }
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Vec<QueueEntry>> {
        let streams = guard(&self.streams)?;
        let state = streams.get(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = state
            .groups
            .get(group)
            .ok_or_else(|| no_group(stream, group))?;

        Ok(group_state
            .pending
            .iter()
            .filter(|(_, (owner, _))| owner == consumer)
            .map(|(entry_id, (_, order))| QueueEntry {
                entry_id: entry_id.clone(),
                order: *order,
            })
            .collect())
    }

    async fn acknowledge(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut streams = guard(&self.streams)?;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        // Acknowledging an already-acked entry is a no-op, like XACK.
        group_state.pending.remove(entry_id);
        Ok(())
    }

    async fn publish(&self, stream: &str, order: &PendingOrder) -> Result<String> {
        let remaining = self.fail_next_publishes.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next_publishes
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(FlashSaleError::Infrastructure(
                "injected publish failure".to_string(),
            ));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry_id = format!("{seq}-0");

        {
            let mut streams = guard(&self.streams)?;
            streams
                .entry(stream.to_string())
                .or_default()
                .entries
                .push((entry_id.clone(), *order));
        }

        self.published.notify_waiters();
        Ok(entry_id)
    }
}
