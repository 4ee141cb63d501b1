//! # Notification Bridge
//!
//! The [`StoreListener`] handed to the platform at initialization. Routes
//! every platform callback into the store, synthesizing a restored
//! [`TransactionProcessor`] when a purchase arrives with none in flight.
//!
//! ## Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  process_purchase(event)                                                │
//! │    ├─ store disposed ─────────────────────────────► Pending (ignored)   │
//! │    ├─ no active processor ─► synthesize restored ─► processor           │
//! │    ├─ active, same product ───────────────────────► processor           │
//! │    └─ active, other product ─► log unexpected ────► Pending             │
//! │                                                                         │
//! │  on_purchase_failed(product?, reason)                                   │
//! │    ├─ active, same product (or product unknown) ─► processor            │
//! │    ├─ active, other product ─► log and drop                             │
//! │    ├─ no active, product known ─► synthesize restored ─► processor      │
//! │    └─ no active, product unknown ─► log and drop                        │
//! │                                                                         │
//! │  on_initialized / on_initialize_failed ─► StoreCore                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bridge holds a weak reference: the platform owning the listener never
//! keeps the store alive.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use iap_core::Product;

use crate::platform::{
    InitializationFailureReason, PlatformFailureReason, ProcessingResult, PurchaseEvent,
    StoreListener,
};
use crate::service::StoreCore;
use crate::transaction::TransactionProcessor;

/// Platform-facing listener of one store.
pub struct NotificationBridge {
    core: Weak<StoreCore>,
}

impl NotificationBridge {
    pub(crate) fn new(core: Weak<StoreCore>) -> Self {
        NotificationBridge { core }
    }

    fn live_core(&self, callback: &'static str) -> Option<Arc<StoreCore>> {
        let Some(core) = self.core.upgrade() else {
            debug!(callback, "Store dropped, ignoring platform callback");
            return None;
        };
        if core.is_disposed() {
            debug!(callback, "Store disposed, ignoring platform callback");
            return None;
        }
        Some(core)
    }

    /// A restored processor is synthesized for the event's own product, so
    /// matching by product id holds for restored and explicit attempts alike.
    fn accepts(processor: &TransactionProcessor, product_id: &str) -> bool {
        processor.product_id() == product_id
    }
}

impl StoreListener for NotificationBridge {
    fn on_initialized(&self, products: Vec<Product>) {
        if let Some(core) = self.live_core("on_initialized") {
            core.complete_initialization(products);
        }
    }

    fn on_initialize_failed(&self, reason: InitializationFailureReason) {
        if let Some(core) = self.live_core("on_initialize_failed") {
            core.fail_initialization(reason.into());
        }
    }

    fn process_purchase(&self, event: PurchaseEvent) -> ProcessingResult {
        let Some(core) = self.live_core("process_purchase") else {
            return ProcessingResult::Pending;
        };

        let processor = match core.registry().active_processor() {
            Some(active) => active,
            None => core.adopt_restored(&event.product_id),
        };

        if !Self::accepts(&processor, &event.product_id) {
            warn!(
                active_product = %processor.product_id(),
                product_id = %event.product_id,
                transaction_id = ?event.transaction_id,
                "Unexpected purchase while another is in flight, not processing"
            );
            return ProcessingResult::Pending;
        }

        processor.process_purchase(event)
    }

    fn on_purchase_failed(&self, product_id: Option<&str>, reason: PlatformFailureReason) {
        let Some(core) = self.live_core("on_purchase_failed") else {
            return;
        };

        let processor = match (core.registry().active_processor(), product_id) {
            (Some(active), None) => active,
            (Some(active), Some(product_id)) => {
                if !Self::accepts(&active, product_id) {
                    warn!(
                        active_product = %active.product_id(),
                        %product_id,
                        ?reason,
                        "Purchase failure for a product that is not in flight, ignoring"
                    );
                    return;
                }
                active
            }
            (None, Some(product_id)) => core.adopt_restored(product_id),
            (None, None) => {
                // TODO: decide whether an anonymous failure with nothing in
                // flight should surface as a PurchaseFailed event.
                warn!(?reason, "Purchase failure with no product and no active purchase, dropping");
                return;
            }
        };

        processor.on_purchase_failed(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::StoreService;
    use crate::test_support::{event, MockPlatform};
    use crate::config::StoreConfig;

    #[test]
    fn test_callbacks_after_store_dropped_are_ignored() {
        let platform = MockPlatform::with_products(&["potion"]);
        let store = StoreService::builder(StoreConfig::default(), platform.clone())
            .build()
            .unwrap();
        store.initialize().unwrap();
        drop(store);

        assert_eq!(
            platform.deliver(event("potion", "T1", "R1")),
            ProcessingResult::Pending
        );
        platform.report_purchase_failed(Some("potion"), PlatformFailureReason::Unknown);
        platform.report_initialized(&["potion"]);
        assert_eq!(platform.confirm_calls(), 0);
    }
}
