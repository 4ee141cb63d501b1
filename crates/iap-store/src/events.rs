//! # Store Events
//!
//! Notifications about store activity, delivered two ways:
//! - a `tokio::sync::broadcast` channel of [`StoreEvent`] values
//!   (`StoreService::subscribe`), and
//! - callback-style [`StoreObserver`]s (`StoreService::add_observer`).
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  operation finishes ──► release registry slot ──► EventHub::emit        │
//! │                                                     │                   │
//! │                               ┌─────────────────────┴──────────┐        │
//! │                               ▼                                ▼        │
//! │                     broadcast::Sender               StoreObserver list  │
//! │                     (lagging receivers               (each call guarded │
//! │                      skip old events)                 by catch_unwind)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::error;

use iap_core::operation::panic_message;
use iap_core::{PurchaseError, PurchaseResult, StoreFetchError, TransactionRecord};

// =============================================================================
// Event Types
// =============================================================================

/// Payload of a failed (or user-canceled) purchase notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseFailedEvent {
    pub product_id: String,
    pub error: PurchaseError,
    pub restored: bool,
    /// Whatever transaction data the platform delivered before the failure.
    pub record: Option<TransactionRecord>,
}

/// Something observable happened in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    Initialized { product_count: usize },
    InitializationFailed { error: StoreFetchError },
    FetchCompleted { product_count: usize },
    FetchFailed { error: StoreFetchError },
    PurchaseInitiated { product_id: String, restored: bool },
    PurchaseCompleted { result: PurchaseResult },
    PurchaseFailed { failure: PurchaseFailedEvent },
}

// =============================================================================
// Observer Trait
// =============================================================================

/// Callback-style subscriber. Every method defaults to a no-op.
///
/// Methods run on the thread that finished the corresponding operation
/// (normally the owner thread). A panic is logged and swallowed.
pub trait StoreObserver: Send + Sync {
    fn on_initialized(&self, _product_count: usize) {}
    fn on_initialize_failed(&self, _error: StoreFetchError) {}
    fn on_fetch_completed(&self, _product_count: usize) {}
    fn on_fetch_failed(&self, _error: StoreFetchError) {}
    fn on_purchase_initiated(&self, _product_id: &str, _restored: bool) {}
    fn on_purchase_completed(&self, _result: &PurchaseResult) {}
    fn on_purchase_failed(&self, _failure: &PurchaseFailedEvent) {}
}

fn deliver(observer: &dyn StoreObserver, event: &StoreEvent) {
    match event {
        StoreEvent::Initialized { product_count } => observer.on_initialized(*product_count),
        StoreEvent::InitializationFailed { error } => observer.on_initialize_failed(*error),
        StoreEvent::FetchCompleted { product_count } => observer.on_fetch_completed(*product_count),
        StoreEvent::FetchFailed { error } => observer.on_fetch_failed(*error),
        StoreEvent::PurchaseInitiated {
            product_id,
            restored,
        } => observer.on_purchase_initiated(product_id, *restored),
        StoreEvent::PurchaseCompleted { result } => observer.on_purchase_completed(result),
        StoreEvent::PurchaseFailed { failure } => observer.on_purchase_failed(failure),
    }
}

// =============================================================================
// Event Hub
// =============================================================================

/// Fans events out to the broadcast channel and registered observers.
pub(crate) struct EventHub {
    tx: broadcast::Sender<StoreEvent>,
    observers: RwLock<Vec<Arc<dyn StoreObserver>>>,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventHub {
            tx,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn add_observer(&self, observer: Arc<dyn StoreObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event.clone());

        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            let delivery = panic::catch_unwind(AssertUnwindSafe(|| deliver(observer.as_ref(), &event)));
            if let Err(panic) = delivery {
                error!(
                    panic = %panic_message(panic.as_ref()),
                    ?event,
                    "Store observer panicked"
                );
            }
        }
    }
}
