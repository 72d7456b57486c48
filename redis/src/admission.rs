//! The atomic admission operation of the fast shared store.
//!
//! One Lua script performs the stock check, the per-user membership check
//! and both mutations as a single unit; no concurrent request for the same
//! voucher ever observes an intermediate state. The stock counter and buyer
//! set are written *only* by this script (and reset by [`prime_stock`]).
//!
//! Idempotency strategy: per-voucher **set membership** of user ids. User
//! ids here are arbitrary 64-bit values, so the bitmap alternative (one bit
//! per dense small id) would degrade; the durable-unique-index alternative
//! costs a database round trip on the hot path. See DESIGN.md.
//!
//! [`prime_stock`]: flashsale_core::providers::AdmissionGate::prime_stock

use crate::{connect, infra};
use flashsale_core::providers::AdmissionGate;
use flashsale_core::{keys, Admission, OrderId, Result, UserId, VoucherId};
use redis::aio::ConnectionManager;
use redis::Script;

/// KEYS = [stock counter, buyer set, user→order hash];
/// ARGV = [user id, order id].
///
/// Returns 0 admitted, 1 insufficient stock, 2 duplicate purchase.
const ADMISSION_SCRIPT: &str = r"
local stock = tonumber(redis.call('GET', KEYS[1]))
if stock == nil or stock <= 0 then
    return 1
end
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1 then
    return 2
end
redis.call('INCRBY', KEYS[1], -1)
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[2])
return 0
";

/// Redis implementation of the atomic admission gate.
///
/// # Example
///
/// ```no_run
/// use flashsale_redis::RedisAdmissionGate;
/// use flashsale_core::providers::AdmissionGate;
/// use flashsale_core::{Admission, OrderId, UserId, VoucherId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gate = RedisAdmissionGate::new("redis://127.0.0.1:6379").await?;
/// gate.prime_stock(VoucherId(7), 100).await?;
///
/// let outcome = gate.try_admit(VoucherId(7), UserId(42), OrderId(1)).await?;
/// assert_eq!(outcome, Admission::Admitted);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisAdmissionGate {
    conn_manager: ConnectionManager,
}

impl RedisAdmissionGate {
    /// Create a new admission gate.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the connection cannot be
    /// established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            conn_manager: connect(redis_url).await?,
        })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn with_connection(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

impl AdmissionGate for RedisAdmissionGate {
    async fn try_admit(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Admission> {
        let mut conn = self.conn_manager.clone();

        let code: i64 = Script::new(ADMISSION_SCRIPT)
            .key(keys::stock(voucher_id))
            .key(keys::buyers(voucher_id))
            .key(keys::orders(voucher_id))
            .arg(user_id.0)
            .arg(order_id.0)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| infra("admission script", &e))?;

        let admission = Admission::from_code(code)?;
        tracing::debug!(
            voucher_id = %voucher_id,
            user_id = %user_id,
            code,
            "Admission script executed"
        );
        Ok(admission)
    }

    async fn prime_stock(&self, voucher_id: VoucherId, stock: i64) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        // One atomic pipeline: a half-primed voucher (stock set, stale
        // buyers) must never be observable by the admission script.
        let _: () = redis::pipe()
            .atomic()
            .set(keys::stock(voucher_id), stock)
            .ignore()
            .del(keys::buyers(voucher_id))
            .ignore()
            .del(keys::orders(voucher_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| infra("prime stock pipeline", &e))?;

        tracing::info!(voucher_id = %voucher_id, stock, "Primed voucher stock in shared store");
        Ok(())
    }
}
