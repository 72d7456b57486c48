//! Lease-scoped distributed lock over Redis.
//!
//! Acquisition is `SET key token NX PX lease`, polled until the wait timeout
//! elapses. Release and renewal are compare-and-delete / compare-and-expire
//! Lua scripts keyed on the holder token, so a holder whose lease already
//! expired can never delete a successor's lease.
//!
//! While a lease is held, a watchdog task renews it at a third of the lease
//! interval, bounded by a hard maximum hold time, so critical sections that
//! outlive the initial lease do not lose the lock mid-flight while crashed
//! holders still free the key within one lease.

use crate::{connect, infra};
use flashsale_core::providers::{DistributedLock, LockLease};
use flashsale_core::Result;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Delete the key only if this caller still holds it.
const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// Extend the lease only if this caller still holds it.
const RENEW_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
";

/// Poll interval while waiting for a contended lock.
const ACQUIRE_POLL: Duration = Duration::from_millis(50);

/// Default hard cap on total hold time enforced by the watchdog.
pub const DEFAULT_MAX_LEASE: Duration = Duration::from_secs(60);

/// Redis implementation of the per-voucher mutual-exclusion lock.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisDistributedLock;
/// use flashsale_core::providers::DistributedLock;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let lock = RedisDistributedLock::new("redis://127.0.0.1:6379").await?;
/// if let Some(lease) = lock
///     .try_acquire("lock:seckill:7", Duration::from_secs(1), Duration::from_secs(10))
///     .await?
/// {
///     // critical section
///     lock.release(lease).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisDistributedLock {
    conn_manager: ConnectionManager,
    max_lease: Duration,
    /// Watchdog renewal tasks, keyed by holder token.
    watchdogs: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl RedisDistributedLock {
    /// Create a new lock client with the default maximum hold time.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the connection cannot be
    /// established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            conn_manager: connect(redis_url).await?,
            max_lease: DEFAULT_MAX_LEASE,
            watchdogs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Set the hard cap on total hold time enforced by the watchdog.
    #[must_use]
    pub fn with_max_lease(mut self, max_lease: Duration) -> Self {
        self.max_lease = max_lease;
        self
    }

    /// Try one `SET NX PX` attempt; `true` if the lease was obtained.
    async fn attempt(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_possible_truncation)] // leases are seconds, not centuries
        let lease_ms = lease.as_millis().max(1) as u64;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| infra("SET NX PX (lock)", &e))?;

        Ok(reply.is_some())
    }

    /// Spawn the lease-renewal watchdog for a freshly acquired lease.
    ///
    /// The task unregisters itself when its loop ends, so watchdogs that
    /// stop on their own (lease lost, hard cap reached) leave no entry
    /// behind in the registry.
    fn spawn_watchdog(&self, key: &str, token: &str, lease: Duration) {
        let mut conn = self.conn_manager.clone();
        let key = key.to_string();
        let token = token.to_string();
        let task_token = token.clone();
        let watchdogs = Arc::clone(&self.watchdogs);
        let max_lease = self.max_lease;
        #[allow(clippy::cast_possible_truncation)]
        let lease_ms = lease.as_millis().max(1) as u64;
        let interval = (lease / 3).max(Duration::from_millis(100));
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                if started.elapsed() + interval >= max_lease {
                    tracing::warn!(
                        key = %key,
                        max_lease_ms = max_lease.as_millis(),
                        "Lock held up to the hard lease cap; stopping renewal"
                    );
                    break;
                }

                let renewed: i64 = match Script::new(RENEW_SCRIPT)
                    .key(&key)
                    .arg(&task_token)
                    .arg(lease_ms)
                    .invoke_async(&mut conn)
                    .await
                {
                    Ok(renewed) => renewed,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Lock renewal failed");
                        break;
                    }
                };

                if renewed == 0 {
                    tracing::debug!(key = %key, "Lease no longer held; stopping renewal");
                    break;
                }

                tracing::trace!(key = %key, lease_ms, "Lease renewed");
            }

            if let Ok(mut watchdogs) = watchdogs.lock() {
                watchdogs.remove(&task_token);
            }
        });

        if let Ok(mut watchdogs) = self.watchdogs.lock() {
            watchdogs.insert(token, handle.abort_handle());
        }
    }

    /// Number of renewal watchdogs currently registered.
    #[must_use]
    pub fn active_watchdogs(&self) -> usize {
        self.watchdogs
            .lock()
            .map_or(0, |watchdogs| watchdogs.len())
    }

    /// Stop the watchdog for a token, if one is running.
    fn stop_watchdog(&self, token: &str) {
        if let Ok(mut watchdogs) = self.watchdogs.lock() {
            if let Some(handle) = watchdogs.remove(token) {
                handle.abort();
            }
        }
    }
}

impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<LockLease>> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;

        loop {
            if self.attempt(key, &token, lease).await? {
                self.spawn_watchdog(key, &token, lease);
                tracing::debug!(key = %key, lease_ms = lease.as_millis(), "Lock acquired");
                return Ok(Some(LockLease {
                    key: key.to_string(),
                    token,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(key = %key, wait_ms = wait.as_millis(), "Lock wait timed out");
                return Ok(None);
            }

            tokio::time::sleep(ACQUIRE_POLL.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        self.stop_watchdog(&lease.token);

        let mut conn = self.conn_manager.clone();
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(&lease.key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| infra("lock release script", &e))?;

        if deleted == 0 {
            // Lease already expired or taken over; release stays idempotent.
            tracing::debug!(key = %lease.key, "Release found no held lease");
        } else {
            tracing::debug!(key = %lease.key, "Lock released");
        }

        Ok(())
    }
}
