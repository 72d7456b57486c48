//! In-memory atomic admission gate.

use super::guard;
use flashsale_core::providers::AdmissionGate;
use flashsale_core::{Admission, OrderId, Result, UserId, VoucherId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct GateState {
    stock: i64,
    buyers: HashSet<UserId>,
    orders: HashMap<UserId, OrderId>,
}

/// Mock admission gate: the tri-state decision runs under one mutex, so it
/// is atomic relative to all concurrent callers, like the real script.
#[derive(Clone, Default)]
pub struct MockAdmissionGate {
    vouchers: Arc<Mutex<HashMap<VoucherId, GateState>>>,
}

impl MockAdmissionGate {
    /// Create a gate with no primed vouchers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining shared-store stock for a voucher, `None` if never primed.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn remaining_stock(&self, voucher_id: VoucherId) -> Option<i64> {
        self.vouchers.lock().unwrap().get(&voucher_id).map(|s| s.stock)
    }

    /// The order id recorded for a buyer at admission, if any.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn order_of(&self, voucher_id: VoucherId, user_id: UserId) -> Option<OrderId> {
        self.vouchers
            .lock()
            .unwrap()
            .get(&voucher_id)
            .and_then(|s| s.orders.get(&user_id).copied())
    }

    /// Number of admitted buyers for a voucher.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn buyer_count(&self, voucher_id: VoucherId) -> usize {
        self.vouchers
            .lock()
            .unwrap()
            .get(&voucher_id)
            .map_or(0, |s| s.buyers.len())
    }
}

impl AdmissionGate for MockAdmissionGate {
    async fn try_admit(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Admission> {
        let mut vouchers = guard(&self.vouchers)?;

        // Unprimed vouchers behave like a missing stock key.
        let Some(state) = vouchers.get_mut(&voucher_id) else {
            return Ok(Admission::InsufficientStock);
        };

        if state.stock <= 0 {
            return Ok(Admission::InsufficientStock);
        }
        if state.buyers.contains(&user_id) {
            return Ok(Admission::DuplicateOrder);
        }

        state.stock -= 1;
        state.buyers.insert(user_id);
        state.orders.insert(user_id, order_id);
        Ok(Admission::Admitted)
    }

    async fn prime_stock(&self, voucher_id: VoucherId, stock: i64) -> Result<()> {
        let mut vouchers = guard(&self.vouchers)?;
        vouchers.insert(
            voucher_id,
            GateState {
                stock,
                buyers: HashSet::new(),
                orders: HashMap::new(),
            },
        );
        Ok(())
    }
}
