//! # iap-store: Purchase Orchestration for the IAP Store
//!
//! Drives store initialization, catalog fetch and purchases against an
//! external commerce platform, and routes the platform's callbacks back into
//! the purchase in flight.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Store Architecture                               │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  StoreService (public facade)                    │  │
//! │  │  initialize() ──► fetch() ──► purchase(id)    → Operation<..>    │  │
//! │  └───────────┬───────────────────────┬───────────────────┬──────────┘  │
//! │              ▼                       ▼                   ▼              │
//! │  ┌────────────────────┐  ┌──────────────────────┐  ┌──────────────┐    │
//! │  │ OperationRegistry  │  │ TransactionProcessor │  │  EventHub    │    │
//! │  │ ≤1 pending per     │  │ validate / confirm   │  │  broadcast + │    │
//! │  │ category           │  │ state machine        │  │  observers   │    │
//! │  └────────────────────┘  └──────────┬───────────┘  └──────────────┘    │
//! │                                     │                                   │
//! │          ┌──────────────────────────┼──────────────────────┐            │
//! │          ▼                          ▼                      ▼            │
//! │  ┌────────────────┐      ┌────────────────────┐   ┌─────────────────┐  │
//! │  │ StorePlatform  │◄────►│ NotificationBridge │   │ ReceiptValidator│  │
//! │  │ (platform SDK) │      │ (StoreListener)    │   │ + OwnerDispatch │  │
//! │  └────────────────┘      └────────────────────┘   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`service`] - `StoreService` facade and its builder
//! - [`registry`] - Pending operation slots
//! - [`transaction`] - `TransactionProcessor` state machine
//! - [`listener`] - `NotificationBridge`, the platform-facing listener
//! - [`platform`] - Platform, listener and validator traits
//! - [`dispatch`] - Owner-thread dispatchers
//! - [`events`] - `StoreEvent` broadcast and observers
//! - [`config`] - Store configuration (TOML + environment)
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use iap_store::{StoreConfig, StoreService};
//!
//! let config = StoreConfig::load_or_default(None);
//! let store = StoreService::builder(config, platform)
//!     .validator(validator)
//!     .build()?;
//!
//! let purchase = store.purchase("sword_of_fire")?;
//! purchase.continue_with(|op| {
//!     if let Some(result) = op.result() {
//!         println!("Bought {}", result.product_id());
//!     }
//! });
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod listener;
pub mod platform;
pub mod registry;
pub mod service;
pub mod transaction;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use config::{StoreConfig, StoreSettings};
pub use dispatch::{InlineDispatcher, OwnerDispatcher, OwnerQueue, OwnerTask, QueueDispatcher};
pub use error::{StoreError, StoreResult};
pub use events::{PurchaseFailedEvent, StoreEvent, StoreObserver};
pub use listener::NotificationBridge;
pub use platform::{
    InitializationFailureReason, PlatformFailureReason, ProcessingResult, PurchaseEvent,
    ReceiptValidator, StoreListener, StorePlatform, ValidationFault, ValidationOperation,
};
pub use registry::{FetchOperation, InitializeOperation, OperationCategory, OperationRegistry};
pub use service::{FetchOutcome, PurchaseOutcome, StoreService, StoreServiceBuilder};
pub use transaction::{ProcessorContext, PurchaseOperation, TransactionProcessor, TransactionState};

// Re-export core types so hosts can depend on this crate alone.
pub use iap_core::{
    OperationError, OperationStatus, Product, ProductCatalog, ProductDefinition, ProductKind,
    ProductMetadata, PurchaseError, PurchaseFailure, PurchaseResult, StoreFetchError,
    TransactionRecord, ValidationVerdict,
};
