//! # Error Types
//!
//! Domain-specific error types for iap-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  iap-core errors (this file)                                           │
//! │  ├── PurchaseError    - Why a purchase attempt did not complete        │
//! │  ├── StoreFetchError  - Why Initialize/Fetch failed                    │
//! │  ├── ValidationError  - Caller input rejected before any operation     │
//! │  └── OperationError   - Terminal non-success of an Operation<T, E>     │
//! │                                                                         │
//! │  iap-store errors (separate crate)                                     │
//! │  └── StoreError       - Synchronous rejections + configuration         │
//! │                                                                         │
//! │  Flow: ValidationError → StoreError (returned immediately)             │
//! │        PurchaseError   → Operation failure channel + PurchaseFailed    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Purchase errors are plain `Copy` codes so they can ride on events
//! 3. User cancellation is a variant, but operations model it as `Canceled`

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Purchase Error
// =============================================================================

/// Reason a purchase attempt ended without a completed transaction.
///
/// ## Where These Come From
/// ```text
/// Local checks          ProductUnavailable, StoreNotInitialized, StoreDisposed
/// Receipt handling      ReceiptNullOrEmpty, ReceiptValidationFailed,
///                       ReceiptValidationNotAvailable
/// Platform failures     PurchasingUnavailable, ExistingPurchasePending,
///                       SignatureInvalid, UserCanceled, PaymentDeclined,
///                       DuplicateTransaction, Unknown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseError {
    /// Product is not in the catalog or cannot be bought right now.
    #[error("Product is unavailable for purchase")]
    ProductUnavailable,

    /// The platform delivered a purchase without a receipt.
    #[error("Purchase receipt is null or empty")]
    ReceiptNullOrEmpty,

    /// The receipt validator rejected the receipt. The purchase is still
    /// confirmed with the platform so it is not redelivered.
    #[error("Receipt validation failed")]
    ReceiptValidationFailed,

    /// The receipt validator could not reach a verdict. The purchase is left
    /// unconfirmed and the platform will deliver it again.
    #[error("Receipt validation is not available")]
    ReceiptValidationNotAvailable,

    /// Purchasing is disabled on this device or account.
    #[error("Purchasing is unavailable")]
    PurchasingUnavailable,

    /// The platform already has a purchase in flight.
    #[error("Another purchase is already pending")]
    ExistingPurchasePending,

    /// The platform could not verify the purchase signature.
    #[error("Purchase signature is invalid")]
    SignatureInvalid,

    /// The user dismissed the purchase dialog.
    #[error("Purchase was canceled by the user")]
    UserCanceled,

    /// Payment was declined by the payment provider.
    #[error("Payment was declined")]
    PaymentDeclined,

    /// The platform reports this transaction was already processed.
    #[error("Duplicate transaction")]
    DuplicateTransaction,

    /// The store has not been initialized (or initialization failed).
    #[error("Store is not initialized")]
    StoreNotInitialized,

    /// The store was disposed while the purchase was in flight.
    #[error("Store was disposed")]
    StoreDisposed,

    /// Anything the platform could not classify.
    #[error("Unknown purchase error")]
    Unknown,
}

impl PurchaseError {
    /// Returns true for the user-cancellation code.
    ///
    /// Operations surface this outcome as `Canceled` rather than `Faulted`,
    /// so callers can tell "declined" apart from "system error".
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, PurchaseError::UserCanceled)
    }

    /// Returns true if the platform is expected to redeliver the purchase.
    pub fn is_redelivered(&self) -> bool {
        matches!(self, PurchaseError::ReceiptValidationNotAvailable)
    }

    /// Returns true if retrying the same purchase later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PurchaseError::ReceiptValidationNotAvailable
                | PurchaseError::ExistingPurchasePending
                | PurchaseError::StoreNotInitialized
                | PurchaseError::Unknown
        )
    }
}

impl From<StoreFetchError> for PurchaseError {
    /// Maps an initialization failure onto the purchase that was waiting for it.
    fn from(err: StoreFetchError) -> Self {
        match err {
            StoreFetchError::PurchasingUnavailable => PurchaseError::PurchasingUnavailable,
            StoreFetchError::StoreDisposed => PurchaseError::StoreDisposed,
            StoreFetchError::NoProductsAvailable
            | StoreFetchError::AppNotKnown
            | StoreFetchError::Unknown => PurchaseError::StoreNotInitialized,
        }
    }
}

// =============================================================================
// Store Fetch Error
// =============================================================================

/// Reason an Initialize or Fetch operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum StoreFetchError {
    /// The platform rejected the application id.
    #[error("Application is not known to the store")]
    AppNotKnown,

    /// None of the requested products exist on the platform.
    #[error("No products available")]
    NoProductsAvailable,

    /// Purchasing is disabled on this device or account.
    #[error("Purchasing is unavailable")]
    PurchasingUnavailable,

    /// The store was disposed before the operation finished.
    #[error("Store was disposed")]
    StoreDisposed,

    /// Anything the platform could not classify.
    #[error("Unknown store error")]
    Unknown,
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Returned synchronously before any operation is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., whitespace in a product id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same product id declared twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Operation Error
// =============================================================================

/// Non-success terminal outcome of an [`Operation`](crate::operation::Operation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError<E> {
    /// The operation failed with an error.
    #[error("Operation faulted: {0}")]
    Faulted(E),

    /// The operation was canceled.
    #[error("Operation was canceled")]
    Canceled,
}

impl<E> OperationError<E> {
    /// Returns the failure error, if the operation faulted.
    pub fn fault(&self) -> Option<&E> {
        match self {
            OperationError::Faulted(err) => Some(err),
            OperationError::Canceled => None,
        }
    }

    /// Returns true if the operation was canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, OperationError::Canceled)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_error_messages() {
        assert_eq!(
            PurchaseError::ReceiptNullOrEmpty.to_string(),
            "Purchase receipt is null or empty"
        );
        assert_eq!(
            PurchaseError::UserCanceled.to_string(),
            "Purchase was canceled by the user"
        );
    }

    #[test]
    fn test_user_cancellation_is_distinct() {
        assert!(PurchaseError::UserCanceled.is_user_cancellation());
        assert!(!PurchaseError::PaymentDeclined.is_user_cancellation());
    }

    #[test]
    fn test_only_not_available_is_redelivered() {
        assert!(PurchaseError::ReceiptValidationNotAvailable.is_redelivered());
        assert!(!PurchaseError::ReceiptValidationFailed.is_redelivered());
        assert!(!PurchaseError::ReceiptNullOrEmpty.is_redelivered());
    }

    #[test]
    fn test_fetch_error_maps_into_purchase_error() {
        assert_eq!(
            PurchaseError::from(StoreFetchError::PurchasingUnavailable),
            PurchaseError::PurchasingUnavailable
        );
        assert_eq!(
            PurchaseError::from(StoreFetchError::StoreDisposed),
            PurchaseError::StoreDisposed
        );
        assert_eq!(
            PurchaseError::from(StoreFetchError::AppNotKnown),
            PurchaseError::StoreNotInitialized
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "product_id".to_string(),
        };
        assert_eq!(err.to_string(), "product_id is required");
    }

    #[test]
    fn test_operation_error_accessors() {
        let err: OperationError<PurchaseError> = OperationError::Faulted(PurchaseError::Unknown);
        assert_eq!(err.fault(), Some(&PurchaseError::Unknown));
        assert!(!err.is_canceled());
        assert!(OperationError::<PurchaseError>::Canceled.is_canceled());
    }

    #[test]
    fn test_purchase_error_serializes_snake_case() {
        let json = serde_json::to_string(&PurchaseError::ReceiptValidationNotAvailable).unwrap();
        assert_eq!(json, "\"receipt_validation_not_available\"");
    }
}
