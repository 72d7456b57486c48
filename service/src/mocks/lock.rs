//! In-memory single-holder lock with bounded waiting.

use super::guard;
use flashsale_core::providers::{DistributedLock, LockLease};
use flashsale_core::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Mock distributed lock: one holder per key, waiters woken on release.
///
/// Leases never expire here; tests that need expiry semantics drive them
/// through release.
#[derive(Clone, Default)]
pub struct MockDistributedLock {
    holders: Arc<Mutex<HashMap<String, String>>>,
    next_token: Arc<AtomicUsize>,
    released: Arc<Notify>,
}

impl MockDistributedLock {
    /// Create an unheld mock lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key is currently held.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.holders.lock().unwrap().contains_key(key)
    }

    /// Seize a key out of band, as a competing process would.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn seize(&self, key: &str) -> LockLease {
        let token = format!("seized-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.holders
            .lock()
            .unwrap()
            .insert(key.to_string(), token.clone());
        LockLease {
            key: key.to_string(),
            token,
        }
    }

    fn try_insert(&self, key: &str) -> Result<Option<String>> {
        let mut holders = guard(&self.holders)?;
        if holders.contains_key(key) {
            return Ok(None);
        }
        let token = format!("lease-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        holders.insert(key.to_string(), token.clone());
        Ok(Some(token))
    }
}

impl DistributedLock for MockDistributedLock {
    async fn try_acquire(
        &self,
        key: &str,
        wait: Duration,
        _lease: Duration,
    ) -> Result<Option<LockLease>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(token) = self.try_insert(key)? {
                return Ok(Some(LockLease {
                    key: key.to_string(),
                    token,
                }));
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let released = self.released.notified();
            if tokio::time::timeout(remaining, released).await.is_err() {
                return Ok(self.try_insert(key)?.map(|token| LockLease {
                    key: key.to_string(),
                    token,
                }));
            }
        }
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        {
            let mut holders = guard(&self.holders)?;
            // Compare-and-delete on the token, like the real release script.
            if holders.get(&lease.key) == Some(&lease.token) {
                holders.remove(&lease.key);
            }
        }
        self.released.notify_waiters();
        Ok(())
    }
}
