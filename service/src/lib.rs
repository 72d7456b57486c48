//! # Flashsale Service
//!
//! The two halves of the purchase pipeline, wired over the `flashsale-core`
//! collaborator traits:
//!
//! - [`AdmissionController`] - the synchronous path: per-voucher lock,
//!   cache-through voucher load, sale-window check, atomic admission in the
//!   fast shared store, enqueue. A purchase is accepted once enqueued.
//! - [`MaterializationWorker`] - the asynchronous path: consume admitted
//!   purchases from the durable queue, insert the order row, decrement
//!   durable stock for newly inserted rows, acknowledge. At-least-once
//!   delivery with pending-entry recovery across crashes.
//!
//! Both are generic over the provider traits; production wiring injects the
//! Redis and Postgres implementations, tests inject [`mocks`].
//!
//! ```
//! use flashsale_service::{AdmissionConfig, AdmissionController};
//! use flashsale_service::mocks::*;
//! use flashsale_core::providers::AdmissionGate;
//! use flashsale_core::{UserId, VoucherId};
//!
//! # async fn example() -> Result<(), flashsale_core::FlashSaleError> {
//! let gate = MockAdmissionGate::new();
//! gate.prime_stock(VoucherId(1), 100).await?;
//!
//! let controller = AdmissionController::new(
//!     MockDistributedLock::new(),
//!     MockSharedCache::new(),
//!     MockSystemOfRecord::new(),
//!     gate,
//!     MockOrderQueue::new(),
//!     MockIdGenerator::new(),
//!     AdmissionConfig::new(),
//! );
//! let outcome = controller.purchase(VoucherId(1), UserId(42)).await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod admission;
pub mod config;
pub mod voucher_cache;
pub mod worker;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use admission::AdmissionController;
pub use config::{AdmissionConfig, WorkerConfig};
pub use voucher_cache::VoucherCache;
pub use worker::MaterializationWorker;
