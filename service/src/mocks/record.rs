//! In-memory system of record with failure injection.

use super::guard;
use flashsale_core::providers::SystemOfRecord;
use flashsale_core::{
    FlashSaleError, OrderId, OrderInsert, Result, Voucher, VoucherId, VoucherOrder,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordState {
    vouchers: HashMap<VoucherId, Voucher>,
    orders: HashMap<OrderId, VoucherOrder>,
}

/// Mock system of record backed by in-memory maps.
///
/// `fail_next_inserts` injects transient insert failures so tests can drive
/// the worker's recovery path.
#[derive(Clone, Default)]
pub struct MockSystemOfRecord {
    state: Arc<Mutex<RecordState>>,
    fail_next_inserts: Arc<AtomicUsize>,
    get_voucher_calls: Arc<AtomicUsize>,
}

impl MockSystemOfRecord {
    /// Create an empty mock record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a voucher row.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn insert_voucher(&self, voucher: Voucher) {
        self.state
            .lock()
            .unwrap()
            .vouchers
            .insert(voucher.voucher_id, voucher);
    }

    /// Durable stock remaining for a voucher.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn stock_of(&self, voucher_id: VoucherId) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .vouchers
            .get(&voucher_id)
            .map(|v| v.stock)
    }

    /// All persisted orders, in no particular order.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn orders(&self) -> Vec<VoucherOrder> {
        self.state.lock().unwrap().orders.values().cloned().collect()
    }

    /// Make the next `n` order inserts fail with an infrastructure error.
    pub fn fail_next_inserts(&self, n: usize) {
        self.fail_next_inserts.store(n, Ordering::SeqCst);
    }

    /// How many times `get_voucher` was called.
    #[must_use]
    pub fn get_voucher_calls(&self) -> usize {
        self.get_voucher_calls.load(Ordering::SeqCst)
    }
}

impl SystemOfRecord for MockSystemOfRecord {
    async fn get_voucher(&self, voucher_id: VoucherId) -> Result<Option<Voucher>> {
        self.get_voucher_calls.fetch_add(1, Ordering::SeqCst);
        let state = guard(&self.state)?;
        Ok(state.vouchers.get(&voucher_id).cloned())
    }

    async fn decrement_stock(&self, voucher_id: VoucherId) -> Result<bool> {
        let mut state = guard(&self.state)?;
        match state.vouchers.get_mut(&voucher_id) {
            Some(voucher) if voucher.stock > 0 => {
                voucher.stock -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_order(&self, order: &VoucherOrder) -> Result<OrderInsert> {
        let remaining = self.fail_next_inserts.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next_inserts
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(FlashSaleError::Infrastructure(
                "injected insert failure".to_string(),
            ));
        }

        let mut state = guard(&self.state)?;
        if state.orders.contains_key(&order.order_id) {
            return Ok(OrderInsert::AlreadyExists);
        }
        state.orders.insert(order.order_id, order.clone());
        Ok(OrderInsert::Inserted)
    }
}
