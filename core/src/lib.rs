//! # Flashsale Core
//!
//! Domain types and collaborator traits for the flash-sale admission and
//! fulfillment pipeline.
//!
//! ## Architecture
//!
//! The synchronous purchase path and the asynchronous order materialization
//! worker communicate only through the narrow interfaces defined in
//! [`providers`]:
//!
//! ```text
//! client ──► AdmissionController ──► { reject | admit + enqueue }
//!                (lock + atomic          │
//!                 admission script)      ▼
//!                              MaterializationWorker ──► System of Record
//! ```
//!
//! The hot path never touches the system of record directly; it mutates the
//! fast shared store (stock counter + per-voucher buyer set) through one
//! atomic operation and publishes admitted purchases onto a durable
//! consumer-group queue.
//!
//! This crate is storage-agnostic: Redis implementations live in
//! `flashsale-redis`, the `PostgreSQL` system of record in
//! `flashsale-postgres`, and orchestration in `flashsale-service`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod error;
pub mod keys;
pub mod providers;
pub mod retry;
pub mod state;

pub use error::{FlashSaleError, Result};
pub use state::{
    Admission, OrderId, OrderInsert, PendingOrder, QueueEntry, UserId, Voucher, VoucherId,
    VoucherOrder,
};
