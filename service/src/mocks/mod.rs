//! Mock provider implementations for testing.
//!
//! In-memory implementations of every collaborator trait, faithful to the
//! contracts the real stores honor: the queue models per-consumer delivery
//! cursors and pending sets, the lock enforces a single holder with bounded
//! waiting, the record supports failure injection for crash and redelivery
//! tests.

pub mod cache;
pub mod gate;
pub mod ids;
pub mod lock;
pub mod queue;
pub mod record;

pub use cache::MockSharedCache;
pub use gate::MockAdmissionGate;
pub use ids::MockIdGenerator;
pub use lock::MockDistributedLock;
pub use queue::MockOrderQueue;
pub use record::MockSystemOfRecord;

use flashsale_core::{FlashSaleError, Result};
use std::sync::{Mutex, MutexGuard};

/// Lock a mock's state mutex, mapping poisoning into the error taxonomy.
pub(crate) fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| FlashSaleError::Infrastructure("mock state mutex poisoned".to_string()))
}
