//! # iap-core: Operation Primitive and Purchase Domain Types
//!
//! Platform-independent building blocks for the in-app purchase store. Nothing
//! in this crate talks to a commerce platform.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        IAP Store Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Application (game / app host)                   │   │
//! │  │    store.purchase("sword_of_fire") ──► Operation<..>            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               iap-store (StoreService, processor, bridge)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ iap-core (THIS CRATE) ★                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ operation │  │   types   │  │  catalog  │  │ validation│  │   │
//! │  │   │ Operation │  │ Product   │  │  Product  │  │  id rules │  │   │
//! │  │   │ WaitHandle│  │ Record    │  │  Catalog  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO PLATFORM CALLS • NO NETWORK • NO FILE SYSTEM              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`operation`] - `Operation<T, E>`: single-assignment result with continuations
//! - [`types`] - Products, transaction records, purchase outcomes
//! - [`catalog`] - Product catalog snapshot
//! - [`error`] - Purchase / fetch / validation error types
//! - [`validation`] - Product id rules
//!
//! ## Example Usage
//!
//! ```rust
//! use iap_core::{Operation, OperationStatus, PurchaseError};
//!
//! let op: Operation<(), PurchaseError> = Operation::pending();
//! op.try_fail(PurchaseError::PaymentDeclined);
//!
//! assert_eq!(op.status(), OperationStatus::Faulted);
//! assert_eq!(op.error(), Some(&PurchaseError::PaymentDeclined));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod operation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::ProductCatalog;
pub use error::{OperationError, PurchaseError, StoreFetchError, ValidationError};
pub use operation::{Operation, OperationStatus, WaitHandle};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a product id.
///
/// The tightest limit among the major stores; ids longer than this are
/// rejected before they reach the platform.
pub const MAX_PRODUCT_ID_LEN: usize = 100;
