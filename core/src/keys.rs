//! Key formats shared between the fast-store implementations and their
//! callers.
//!
//! Every key written to the shared store is built here, so the admission
//! script, the cache loader and the mocks agree on layout.

use crate::state::VoucherId;

/// Per-voucher mutual-exclusion lock key.
#[must_use]
pub fn seckill_lock(voucher_id: VoucherId) -> String {
    format!("lock:seckill:{voucher_id}")
}

/// Cached voucher metadata (JSON value, bounded TTL).
#[must_use]
pub fn voucher_cache(voucher_id: VoucherId) -> String {
    format!("cache:voucher:{voucher_id}")
}

/// Cached stock counter, mutated only by the admission script.
#[must_use]
pub fn stock(voucher_id: VoucherId) -> String {
    format!("seckill:stock:{voucher_id}")
}

/// Per-voucher buyer membership set, the idempotency witness.
#[must_use]
pub fn buyers(voucher_id: VoucherId) -> String {
    format!("seckill:buyers:{voucher_id}")
}

/// Per-voucher user-to-order-id hash, recorded at admission.
#[must_use]
pub fn orders(voucher_id: VoucherId) -> String {
    format!("seckill:orders:{voucher_id}")
}

/// Daily sequence counter for a scope, e.g. `icr:order:20260829`.
#[must_use]
pub fn sequence(scope: &str, yyyymmdd: &str) -> String {
    format!("icr:{scope}:{yyyymmdd}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats_are_stable() {
        let id = VoucherId(12);
        assert_eq!(seckill_lock(id), "lock:seckill:12");
        assert_eq!(voucher_cache(id), "cache:voucher:12");
        assert_eq!(stock(id), "seckill:stock:12");
        assert_eq!(buyers(id), "seckill:buyers:12");
        assert_eq!(orders(id), "seckill:orders:12");
        assert_eq!(sequence("order", "20260829"), "icr:order:20260829");
    }
}
