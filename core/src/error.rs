//! Error types for the flash-sale pipeline.

use thiserror::Error;

/// Result type alias for flash-sale operations.
pub type Result<T> = std::result::Result<T, FlashSaleError>;

/// Error taxonomy for the admission and fulfillment pipeline.
///
/// The first six variants are expected, validated outcomes returned
/// synchronously to the caller. [`Infrastructure`](Self::Infrastructure)
/// covers store or transport faults; the admission controller logs the cause
/// and surfaces it to callers as [`SystemBusy`](Self::SystemBusy) so
/// internals never leak, and the materialization worker recovers it locally
/// instead of terminating.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlashSaleError {
    // ═══════════════════════════════════════════════════════════
    // Admission outcomes (user-facing)
    // ═══════════════════════════════════════════════════════════
    /// Lock contention timed out. Recoverable; the caller should retry later.
    #[error("System busy, please retry later")]
    SystemBusy,

    /// The sale window has not opened yet.
    #[error("Sale has not started")]
    NotStarted,

    /// The sale window has closed.
    #[error("Sale has ended")]
    Ended,

    /// Admission denied: no stock remaining.
    #[error("Insufficient stock")]
    InsufficientStock,

    /// This user already holds an order for this voucher.
    #[error("Duplicate order for this voucher")]
    DuplicateOrder,

    /// No such voucher exists in the system of record.
    #[error("Voucher not found")]
    VoucherNotFound,

    // ═══════════════════════════════════════════════════════════
    // System faults
    // ═══════════════════════════════════════════════════════════
    /// A store or transport operation failed.
    ///
    /// Never shown to end users; the purchase path maps it to
    /// [`SystemBusy`](Self::SystemBusy) after logging.
    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),
}

impl FlashSaleError {
    /// Returns `true` if this error is an expected, user-facing admission
    /// outcome rather than a system fault.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flashsale_core::FlashSaleError;
    /// assert!(FlashSaleError::InsufficientStock.is_user_error());
    /// assert!(!FlashSaleError::Infrastructure("redis down".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotStarted
                | Self::Ended
                | Self::InsufficientStock
                | Self::DuplicateOrder
                | Self::VoucherNotFound
        )
    }

    /// Returns `true` if retrying the operation later may succeed.
    ///
    /// Window violations, stock exhaustion and duplicate orders are final;
    /// contention and infrastructure faults are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SystemBusy | Self::Infrastructure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_not_retryable() {
        for err in [
            FlashSaleError::NotStarted,
            FlashSaleError::Ended,
            FlashSaleError::InsufficientStock,
            FlashSaleError::DuplicateOrder,
            FlashSaleError::VoucherNotFound,
        ] {
            assert!(err.is_user_error());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn faults_are_retryable() {
        assert!(FlashSaleError::SystemBusy.is_retryable());
        assert!(FlashSaleError::Infrastructure("timeout".into()).is_retryable());
        assert!(!FlashSaleError::SystemBusy.is_user_error());
    }
}
