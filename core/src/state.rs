//! Domain types for vouchers, orders and admission outcomes.

use crate::error::{FlashSaleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a flash-sale voucher.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VoucherId(pub i64);

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a purchasing user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an order.
///
/// Assigned at admission time by the sequence generator, so the caller knows
/// it synchronously; time-ordered, unique across nodes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A flash-sale voucher: finite stock sold within a fixed window.
///
/// Owned by the system of record and cached read-mostly in the fast shared
/// store with a bounded TTL. The cached stock counter converges to the
/// system-of-record stock once all in-flight orders persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Voucher identifier.
    pub voucher_id: VoucherId,
    /// Remaining stock. Never observed negative by a successful admission.
    pub stock: i64,
    /// Start of the sale window (inclusive).
    pub begin_time: DateTime<Utc>,
    /// End of the sale window (inclusive).
    pub end_time: DateTime<Utc>,
}

/// A durably persisted order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherOrder {
    /// Unique order identifier, assigned at admission time.
    pub order_id: OrderId,
    /// The purchasing user.
    pub user_id: UserId,
    /// The purchased voucher.
    pub voucher_id: VoucherId,
    /// Persistence timestamp.
    pub created_at: DateTime<Utc>,
}

/// An admitted purchase travelling on the order queue, not yet persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Order identifier assigned at admission.
    pub order_id: OrderId,
    /// The purchasing user.
    pub user_id: UserId,
    /// The purchased voucher.
    pub voucher_id: VoucherId,
}

impl PendingOrder {
    /// Materialize this pending purchase into an order row.
    #[must_use]
    pub const fn into_order(self, created_at: DateTime<Utc>) -> VoucherOrder {
        VoucherOrder {
            order_id: self.order_id,
            user_id: self.user_id,
            voucher_id: self.voucher_id,
            created_at,
        }
    }
}

/// One delivered queue record: transport entry id plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Transport-assigned entry id, used for acknowledgment.
    pub entry_id: String,
    /// The admitted purchase.
    pub order: PendingOrder,
}

/// Outcome of the atomic admission operation.
///
/// The stock check, the membership check and both mutations execute as a
/// single indivisible unit in the fast shared store; no concurrent request
/// for the same voucher observes an intermediate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stock decremented, user recorded as a buyer, order id recorded.
    Admitted,
    /// No stock remaining.
    InsufficientStock,
    /// This user already purchased this voucher.
    DuplicateOrder,
}

impl Admission {
    /// Wire code for this outcome, as returned by the admission script.
    #[must_use]
    pub const fn as_code(self) -> i64 {
        match self {
            Self::Admitted => 0,
            Self::InsufficientStock => 1,
            Self::DuplicateOrder => 2,
        }
    }

    /// Parse a script return code.
    ///
    /// # Errors
    ///
    /// Unknown codes are an [`FlashSaleError::Infrastructure`] fault, never
    /// mistaken for a stock rejection.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Admitted),
            1 => Ok(Self::InsufficientStock),
            2 => Ok(Self::DuplicateOrder),
            other => Err(FlashSaleError::Infrastructure(format!(
                "admission script returned unknown code {other}"
            ))),
        }
    }
}

/// Outcome of inserting an order into the system of record.
///
/// Redelivered queue entries re-insert with an already-used order id;
/// that duplicate key is a successful no-op, which turns the queue's
/// at-least-once delivery into exactly-once observable order rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderInsert {
    /// A new row was written.
    Inserted,
    /// A row with this order id already exists.
    AlreadyExists,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn admission_codes_round_trip() {
        for admission in [
            Admission::Admitted,
            Admission::InsufficientStock,
            Admission::DuplicateOrder,
        ] {
            assert_eq!(Admission::from_code(admission.as_code()), Ok(admission));
        }
    }

    #[test]
    fn unknown_admission_code_is_infrastructure_fault() {
        let err = Admission::from_code(7).unwrap_err();
        assert!(matches!(err, FlashSaleError::Infrastructure(_)));
        assert!(!err.is_user_error());
    }

    #[test]
    fn pending_order_materializes_with_timestamp() {
        let pending = PendingOrder {
            order_id: OrderId(42),
            user_id: UserId(7),
            voucher_id: VoucherId(1),
        };
        let now = Utc::now();
        let order = pending.into_order(now);
        assert_eq!(order.order_id, OrderId(42));
        assert_eq!(order.user_id, UserId(7));
        assert_eq!(order.voucher_id, VoucherId(1));
        assert_eq!(order.created_at, now);
    }
}
