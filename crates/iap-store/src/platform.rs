//! # Platform Seams
//!
//! Traits and message types at the boundary with the commerce platform and
//! the application's receipt validator.
//!
//! ## Call Directions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   iap-store ──── StorePlatform ────────────►  Commerce platform SDK     │
//! │                  initialize                                             │
//! │                  initiate_purchase                                      │
//! │                  confirm_pending_purchase                               │
//! │                  fetch_additional_products                              │
//! │                                                                         │
//! │   iap-store ◄─── StoreListener ─────────────  Commerce platform SDK     │
//! │                  on_initialized                                         │
//! │                  on_initialize_failed                                   │
//! │                  process_purchase → Complete | Pending                  │
//! │                  on_purchase_failed                                     │
//! │                                                                         │
//! │   iap-store ──── ReceiptValidator ─────────►  Application backend       │
//! │                  validate → Operation<Option<ValidationVerdict>>        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iap_core::{
    Operation, Product, ProductDefinition, PurchaseError, StoreFetchError, TransactionRecord,
    ValidationVerdict,
};

// =============================================================================
// Platform → Store Messages
// =============================================================================

/// What the store tells the platform after `process_purchase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingResult {
    /// The purchase is confirmed; the platform may finalize it.
    Complete,
    /// Hold the purchase open. It is either confirmed later through
    /// `confirm_pending_purchase` or redelivered on a future launch.
    Pending,
}

/// A purchase the platform reports as paid and awaiting processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub product_id: String,
    pub transaction_id: Option<String>,
    pub receipt: Option<String>,
    pub store_id: String,
}

impl PurchaseEvent {
    /// Snapshots the event into a transaction record.
    pub fn to_record(&self, restored: bool) -> TransactionRecord {
        TransactionRecord {
            product_id: self.product_id.clone(),
            transaction_id: self.transaction_id.clone(),
            receipt: self.receipt.clone(),
            store_id: self.store_id.clone(),
            restored,
            created_at: Utc::now(),
        }
    }
}

/// Platform reason for a failed initialization or product fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationFailureReason {
    PurchasingUnavailable,
    NoProductsAvailable,
    AppNotKnown,
}

impl From<InitializationFailureReason> for StoreFetchError {
    fn from(reason: InitializationFailureReason) -> Self {
        match reason {
            InitializationFailureReason::PurchasingUnavailable => {
                StoreFetchError::PurchasingUnavailable
            }
            InitializationFailureReason::NoProductsAvailable => StoreFetchError::NoProductsAvailable,
            InitializationFailureReason::AppNotKnown => StoreFetchError::AppNotKnown,
        }
    }
}

/// Platform reason for a failed purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFailureReason {
    PurchasingUnavailable,
    ExistingPurchasePending,
    ProductUnavailable,
    SignatureInvalid,
    UserCancelled,
    PaymentDeclined,
    DuplicateTransaction,
    Unknown,
}

impl From<PlatformFailureReason> for PurchaseError {
    fn from(reason: PlatformFailureReason) -> Self {
        match reason {
            PlatformFailureReason::PurchasingUnavailable => PurchaseError::PurchasingUnavailable,
            PlatformFailureReason::ExistingPurchasePending => PurchaseError::ExistingPurchasePending,
            PlatformFailureReason::ProductUnavailable => PurchaseError::ProductUnavailable,
            PlatformFailureReason::SignatureInvalid => PurchaseError::SignatureInvalid,
            PlatformFailureReason::UserCancelled => PurchaseError::UserCanceled,
            PlatformFailureReason::PaymentDeclined => PurchaseError::PaymentDeclined,
            PlatformFailureReason::DuplicateTransaction => PurchaseError::DuplicateTransaction,
            PlatformFailureReason::Unknown => PurchaseError::Unknown,
        }
    }
}

// =============================================================================
// Store → Platform
// =============================================================================

/// Called with the products returned by a fetch.
pub type ProductsCallback = Box<dyn FnOnce(Vec<Product>) + Send>;

/// Called when a fetch fails.
pub type FetchFailedCallback = Box<dyn FnOnce(InitializationFailureReason) + Send>;

/// Adapter over the commerce platform SDK.
///
/// Payment processing, catalog sync and SDK bootstrap stay behind this trait.
/// Implementations deliver results through the [`StoreListener`] passed to
/// `initialize` (and the callbacks passed to `fetch_additional_products`),
/// normally on the owner thread.
pub trait StorePlatform: Send + Sync {
    /// Starts platform initialization for `products`.
    fn initialize(&self, products: &[ProductDefinition], listener: Arc<dyn StoreListener>);

    /// Opens the platform purchase flow for `product`.
    fn initiate_purchase(&self, product: &Product);

    /// Finalizes a purchase previously answered with `Pending`.
    fn confirm_pending_purchase(&self, record: &TransactionRecord);

    /// Requests products beyond the ones given at initialization.
    fn fetch_additional_products(
        &self,
        products: &[ProductDefinition],
        on_ok: ProductsCallback,
        on_fail: FetchFailedCallback,
    );
}

/// Platform-driven notifications consumed by the store.
pub trait StoreListener: Send + Sync {
    /// Initialization succeeded with these products.
    fn on_initialized(&self, products: Vec<Product>);

    /// Initialization failed.
    fn on_initialize_failed(&self, reason: InitializationFailureReason);

    /// A paid purchase needs processing. May arrive with no purchase in
    /// flight (restores, purchases left over from a previous session).
    fn process_purchase(&self, event: PurchaseEvent) -> ProcessingResult;

    /// A purchase failed. The platform does not always know which product.
    fn on_purchase_failed(&self, product_id: Option<&str>, reason: PlatformFailureReason);
}

// =============================================================================
// Receipt Validation
// =============================================================================

/// Validator infrastructure failure (network down, backend error).
///
/// Treated like a `NotAvailable` verdict: the purchase stays unconfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Receipt validation fault: {0}")]
pub struct ValidationFault(pub String);

/// Outcome of a receipt validation request.
///
/// `Ok(None)` means the validator chose not to validate ("suppressed").
pub type ValidationOperation = Operation<Option<ValidationVerdict>, ValidationFault>;

/// Application-supplied receipt validator.
///
/// Return an already-finished operation for a synchronous verdict, or a
/// pending one completed later (from any thread) for an asynchronous verdict.
pub trait ReceiptValidator: Send + Sync {
    fn validate(&self, record: &TransactionRecord) -> ValidationOperation;
}

impl<F> ReceiptValidator for F
where
    F: Fn(&TransactionRecord) -> ValidationOperation + Send + Sync,
{
    fn validate(&self, record: &TransactionRecord) -> ValidationOperation {
        self(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_cancel_maps_to_user_canceled() {
        let err = PurchaseError::from(PlatformFailureReason::UserCancelled);
        assert!(err.is_user_cancellation());
        assert_eq!(
            PurchaseError::from(PlatformFailureReason::DuplicateTransaction),
            PurchaseError::DuplicateTransaction
        );
    }

    #[test]
    fn test_initialization_reason_maps_to_fetch_error() {
        assert_eq!(
            StoreFetchError::from(InitializationFailureReason::AppNotKnown),
            StoreFetchError::AppNotKnown
        );
    }

    #[test]
    fn test_event_to_record_copies_fields() {
        let event = PurchaseEvent {
            product_id: "potion".into(),
            transaction_id: Some("T9".into()),
            receipt: Some("R9".into()),
            store_id: "TestStore".into(),
        };
        let record = event.to_record(true);
        assert_eq!(record.product_id, "potion");
        assert_eq!(record.transaction_id.as_deref(), Some("T9"));
        assert!(record.restored);
    }

    #[test]
    fn test_closure_is_a_validator() {
        let validator = |_: &TransactionRecord| ValidationOperation::completed(Some(ValidationVerdict::Ok));
        let record = PurchaseEvent {
            product_id: "potion".into(),
            transaction_id: None,
            receipt: Some("R".into()),
            store_id: "TestStore".into(),
        }
        .to_record(false);
        let op = ReceiptValidator::validate(&validator, &record);
        assert_eq!(op.result(), Some(&Some(ValidationVerdict::Ok)));
    }
}
