//! # Transaction Processor
//!
//! Drives one purchase attempt from catalog lookup to a terminal outcome.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Created ──initiate──► Initiated ──► PlatformProcessing                 │
//! │     │         │                             │                           │
//! │     │         └─ not in catalog ─► Failed(ProductUnavailable)           │
//! │     │                                       │ process_purchase          │
//! │     └──── restored (no initiate) ───────────┤                           │
//! │                                             ▼                           │
//! │                  empty receipt ◄─────── Validating                      │
//! │              Failed(ReceiptNullOrEmpty)     │                           │
//! │                                             ▼ verdict                   │
//! │   ┌─────────────────────┬───────────────────┴──────────────────┐        │
//! │   ▼ Ok / none           ▼ Failure                              ▼        │
//! │  Confirming          Confirming                       NotAvailable      │
//! │   │ confirm             │ confirm                     (no confirm)      │
//! │   ▼                     ▼                                      ▼        │
//! │  Completed    Failed(ReceiptValidationFailed)  Failed(...NotAvailable)  │
//! │                                                                         │
//! │  on_purchase_failed: UserCancelled ─► Canceled, other ─► Failed(reason) │
//! │  dispose: ─► Failed(StoreDisposed), no platform call                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Confirmation
//! A synchronous verdict confirms by answering `process_purchase` with
//! [`ProcessingResult::Complete`]. An asynchronous verdict answers `Pending`
//! and confirms later through `StorePlatform::confirm_pending_purchase`, after
//! the work is posted back to the owner thread. A transaction is confirmed at
//! most once either way, and only by the call that moved the attempt to its
//! terminal state.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use iap_core::operation::panic_message;
use iap_core::{
    Operation, OperationError, Product, ProductCatalog, PurchaseError, PurchaseFailure,
    PurchaseResult, TransactionRecord, ValidationVerdict,
};

use crate::dispatch::OwnerDispatcher;
use crate::platform::{
    PlatformFailureReason, ProcessingResult, PurchaseEvent, ReceiptValidator, StorePlatform,
    ValidationFault, ValidationOperation,
};

/// Operation returned by `StoreService::purchase`.
pub type PurchaseOperation = Operation<PurchaseResult, PurchaseFailure>;

// =============================================================================
// Transaction State
// =============================================================================

/// Where a purchase attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Created,
    Initiated,
    PlatformProcessing,
    Validating,
    Confirming,
    Completed,
    Failed,
    Canceled,
}

impl TransactionState {
    const ORDER: [TransactionState; 8] = [
        TransactionState::Created,
        TransactionState::Initiated,
        TransactionState::PlatformProcessing,
        TransactionState::Validating,
        TransactionState::Confirming,
        TransactionState::Completed,
        TransactionState::Failed,
        TransactionState::Canceled,
    ];

    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        Self::ORDER
            .get(raw as usize)
            .copied()
            .unwrap_or(TransactionState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Completed | TransactionState::Failed | TransactionState::Canceled
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Created => "created",
            TransactionState::Initiated => "initiated",
            TransactionState::PlatformProcessing => "platform_processing",
            TransactionState::Validating => "validating",
            TransactionState::Confirming => "confirming",
            TransactionState::Completed => "completed",
            TransactionState::Failed => "failed",
            TransactionState::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Processor Context
// =============================================================================

/// Collaborators shared by every processor of one store.
#[derive(Clone)]
pub struct ProcessorContext {
    pub platform: Arc<dyn StorePlatform>,
    /// `None` accepts every receipt without validation.
    pub validator: Option<Arc<dyn ReceiptValidator>>,
    pub dispatcher: Arc<dyn OwnerDispatcher>,
}

/// What to do with a validated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    /// Confirm and complete. `None` when validation was suppressed.
    Accept(Option<ValidationVerdict>),
    /// Confirm so the receipt is not replayed, then fail.
    Reject,
    /// Leave unconfirmed and fail; the platform redelivers.
    Defer,
}

impl Decision {
    fn confirms(&self) -> bool {
        !matches!(self, Decision::Defer)
    }

    fn from_validation(validation: &ValidationOperation) -> Self {
        match validation.outcome() {
            Some(Ok(None)) => Decision::Accept(None),
            Some(Ok(Some(ValidationVerdict::Ok))) => Decision::Accept(Some(ValidationVerdict::Ok)),
            Some(Ok(Some(ValidationVerdict::Failure))) => Decision::Reject,
            Some(Ok(Some(ValidationVerdict::NotAvailable))) => Decision::Defer,
            Some(Err(OperationError::Faulted(fault))) => {
                warn!(error = %fault, "Receipt validator faulted, treating as not available");
                Decision::Defer
            }
            Some(Err(OperationError::Canceled)) | None => Decision::Defer,
        }
    }
}

// =============================================================================
// Transaction Processor
// =============================================================================

/// One purchase attempt, explicit or restored.
pub struct TransactionProcessor {
    attempt_id: Uuid,
    product_id: String,
    restored: bool,
    state: AtomicU8,
    product: OnceLock<Product>,
    record: OnceLock<TransactionRecord>,
    confirmed: AtomicBool,
    operation: PurchaseOperation,
    context: ProcessorContext,
}

impl TransactionProcessor {
    /// Creates a processor in the `Created` state.
    ///
    /// Restored processors skip `initiate`: the platform already holds a
    /// paid transaction for them.
    pub fn new(
        product_id: impl Into<String>,
        restored: bool,
        context: ProcessorContext,
    ) -> Arc<Self> {
        let processor = Arc::new(TransactionProcessor {
            attempt_id: Uuid::new_v4(),
            product_id: product_id.into(),
            restored,
            state: AtomicU8::new(TransactionState::Created.to_raw()),
            product: OnceLock::new(),
            record: OnceLock::new(),
            confirmed: AtomicBool::new(false),
            operation: PurchaseOperation::pending(),
            context,
        });
        debug!(
            attempt_id = %processor.attempt_id,
            product_id = %processor.product_id,
            restored,
            op_id = processor.operation.id(),
            "Transaction processor created"
        );
        processor
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// The catalog product, once `initiate` resolved it.
    pub fn product(&self) -> Option<&Product> {
        self.product.get()
    }

    /// The transaction record, once the platform delivered the purchase.
    pub fn record(&self) -> Option<&TransactionRecord> {
        self.record.get()
    }

    /// The purchase operation this processor finishes.
    pub fn operation(&self) -> &PurchaseOperation {
        &self.operation
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Initiation
    // =========================================================================

    /// Resolves the product and opens the platform purchase flow.
    pub fn initiate(&self, catalog: &ProductCatalog) {
        if self.state() != TransactionState::Created {
            debug!(attempt_id = %self.attempt_id, state = %self.state(), "Ignoring initiate");
            return;
        }

        let Some(product) = catalog.purchasable(&self.product_id) else {
            warn!(
                attempt_id = %self.attempt_id,
                product_id = %self.product_id,
                "Product is not in the catalog or not purchasable"
            );
            self.fail(PurchaseError::ProductUnavailable);
            return;
        };

        let product = self.product.get_or_init(|| product.clone());
        if !self.advance(TransactionState::Created, TransactionState::Initiated)
            || !self.advance(TransactionState::Initiated, TransactionState::PlatformProcessing)
        {
            return;
        }

        info!(
            attempt_id = %self.attempt_id,
            product_id = %self.product_id,
            store_id = %product.definition.store_id(),
            "Initiating platform purchase"
        );
        self.context.platform.initiate_purchase(product);
    }

    // =========================================================================
    // Purchase Processing
    // =========================================================================

    /// Handles a paid purchase reported by the platform.
    pub fn process_purchase(self: &Arc<Self>, event: PurchaseEvent) -> ProcessingResult {
        if self.operation.is_done() {
            debug!(attempt_id = %self.attempt_id, "Purchase event for a finished attempt");
            return ProcessingResult::Pending;
        }

        if !self.restored && event.product_id != self.product_id {
            warn!(
                attempt_id = %self.attempt_id,
                expected = %self.product_id,
                received = %event.product_id,
                "Unexpected product in purchase event, leaving it for redelivery"
            );
            return ProcessingResult::Pending;
        }

        let record = event.to_record(self.restored);
        if self.record.set(record).is_err() {
            warn!(
                attempt_id = %self.attempt_id,
                transaction_id = ?event.transaction_id,
                "Attempt already holds a transaction, leaving this one for redelivery"
            );
            return ProcessingResult::Pending;
        }
        let Some(record) = self.record.get() else {
            return ProcessingResult::Pending;
        };
        // Restored attempts never went through initiate.
        if !self.advance(TransactionState::PlatformProcessing, TransactionState::Validating)
            && !self.advance(TransactionState::Created, TransactionState::Validating)
        {
            debug!(
                attempt_id = %self.attempt_id,
                state = ?self.state(),
                "Attempt left processing before validation, not confirming"
            );
            return ProcessingResult::Pending;
        }

        info!(
            attempt_id = %self.attempt_id,
            product_id = %record.product_id,
            transaction_id = ?record.transaction_id,
            restored = record.restored,
            "Processing purchase"
        );

        if record.has_empty_receipt() {
            self.fail(PurchaseError::ReceiptNullOrEmpty);
            return ProcessingResult::Pending;
        }

        let validation = self.request_validation(record);
        if validation.is_done() {
            let decision = Decision::from_validation(&validation);
            let confirms = decision.confirms();
            let settled = self.settle(decision);
            return if confirms && settled && self.claim_confirmation() {
                ProcessingResult::Complete
            } else {
                ProcessingResult::Pending
            };
        }

        debug!(attempt_id = %self.attempt_id, "Awaiting asynchronous receipt validation");
        let processor = Arc::clone(self);
        validation.continue_with(move |validation| {
            let decision = Decision::from_validation(validation);
            let dispatcher = Arc::clone(&processor.context.dispatcher);
            dispatcher.post(Box::new(move || processor.finish_deferred(decision)));
        });
        ProcessingResult::Pending
    }

    fn request_validation(&self, record: &TransactionRecord) -> ValidationOperation {
        let Some(validator) = self.context.validator.as_ref() else {
            return ValidationOperation::completed(None);
        };

        panic::catch_unwind(AssertUnwindSafe(|| validator.validate(record))).unwrap_or_else(
            |panic| {
                let message = panic_message(panic.as_ref());
                warn!(attempt_id = %self.attempt_id, panic = %message, "Receipt validator panicked");
                ValidationOperation::faulted(ValidationFault(message))
            },
        )
    }

    /// Owner-thread half of an asynchronous validation.
    fn finish_deferred(&self, decision: Decision) {
        if self.operation.is_done() {
            debug!(
                attempt_id = %self.attempt_id,
                "Attempt finished while validation was pending, skipping confirmation"
            );
            return;
        }

        let confirms = decision.confirms();
        if !self.settle(decision) {
            debug!(
                attempt_id = %self.attempt_id,
                "Attempt finished elsewhere, skipping confirmation"
            );
            return;
        }

        if confirms && self.claim_confirmation() {
            if let Some(record) = self.record.get() {
                debug!(
                    attempt_id = %self.attempt_id,
                    transaction_id = ?record.transaction_id,
                    "Confirming pending purchase"
                );
                self.context.platform.confirm_pending_purchase(record);
            }
        }
    }

    fn claim_confirmation(&self) -> bool {
        !self.confirmed.swap(true, Ordering::AcqRel)
    }

    /// Returns whether this call moved the attempt to its terminal state.
    fn settle(&self, decision: Decision) -> bool {
        if decision.confirms() {
            self.advance(TransactionState::Validating, TransactionState::Confirming);
        }

        match decision {
            Decision::Accept(verdict) => self.complete(verdict),
            Decision::Reject => self.fail(PurchaseError::ReceiptValidationFailed),
            Decision::Defer => self.fail(PurchaseError::ReceiptValidationNotAvailable),
        }
    }

    // =========================================================================
    // Failure Paths
    // =========================================================================

    /// Handles a platform-reported purchase failure.
    pub fn on_purchase_failed(&self, reason: PlatformFailureReason) {
        let error = PurchaseError::from(reason);
        if error.is_user_cancellation() {
            self.cancel();
        } else {
            self.fail(error);
        }
    }

    /// Force-fails the attempt because the store is going away.
    pub fn dispose(&self) {
        self.fail(PurchaseError::StoreDisposed);
    }

    /// Fails the attempt before it reached the platform (initialization
    /// failed underneath it).
    pub(crate) fn abort(&self, error: PurchaseError) {
        self.fail(error);
    }

    // =========================================================================
    // Terminal Transitions
    // =========================================================================

    // Each returns whether it won the terminal transition.

    fn complete(&self, verdict: Option<ValidationVerdict>) -> bool {
        let Some(record) = self.record.get().cloned() else {
            self.fail(PurchaseError::Unknown);
            return false;
        };
        if !self.enter_terminal(TransactionState::Completed) {
            return false;
        }

        info!(
            attempt_id = %self.attempt_id,
            product_id = %self.product_id,
            transaction_id = ?record.transaction_id,
            ?verdict,
            "Purchase completed"
        );
        self.operation.try_complete(PurchaseResult {
            record,
            verdict,
            completed_at: Utc::now(),
        })
    }

    fn fail(&self, error: PurchaseError) -> bool {
        if !self.enter_terminal(TransactionState::Failed) {
            return false;
        }

        warn!(
            attempt_id = %self.attempt_id,
            product_id = %self.product_id,
            %error,
            "Purchase failed"
        );
        self.operation.try_fail(PurchaseFailure {
            product_id: self.product_id.clone(),
            error,
            record: self.record.get().cloned(),
        })
    }

    fn cancel(&self) -> bool {
        if !self.enter_terminal(TransactionState::Canceled) {
            return false;
        }

        info!(attempt_id = %self.attempt_id, product_id = %self.product_id, "Purchase canceled by user");
        self.operation.try_cancel()
    }

    fn advance(&self, from: TransactionState, to: TransactionState) -> bool {
        self.state
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves to a terminal state unless one was already reached.
    fn enter_terminal(&self, terminal: TransactionState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if TransactionState::from_raw(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                current,
                terminal.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("attempt_id", &self.attempt_id)
            .field("product_id", &self.product_id)
            .field("restored", &self.restored)
            .field("state", &self.state())
            .field("operation", &self.operation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        catalog, event, processor, processor_with, ScriptedValidator, MockPlatform,
    };
    use crate::dispatch::{InlineDispatcher, QueueDispatcher};
    use std::sync::Weak;

    #[test]
    fn test_missing_product_fails_without_platform_call() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "missing_id", false);

        processor.initiate(&catalog(&["sword_of_fire"]));

        assert_eq!(processor.state(), TransactionState::Failed);
        assert_eq!(
            processor.operation().error().map(|f| f.error),
            Some(PurchaseError::ProductUnavailable)
        );
        assert_eq!(platform.initiate_calls(), 0);
    }

    #[test]
    fn test_unavailable_product_fails() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "relic", false);
        let mut products = catalog(&[]);
        let mut relic = Product::new(iap_core::ProductDefinition::new(
            "relic",
            iap_core::ProductKind::NonConsumable,
        ));
        relic.available_to_purchase = false;
        products.extend([relic]);

        processor.initiate(&products);
        assert_eq!(
            processor.operation().error().map(|f| f.error),
            Some(PurchaseError::ProductUnavailable)
        );
        assert_eq!(platform.initiate_calls(), 0);
    }

    #[test]
    fn test_sync_ok_verdict_completes_and_confirms() {
        let platform = MockPlatform::new();
        let processor = processor_with(
            &platform,
            "sword_of_fire",
            false,
            Some(ScriptedValidator::sync(Some(ValidationVerdict::Ok))),
        );
        processor.initiate(&catalog(&["sword_of_fire"]));
        assert_eq!(processor.state(), TransactionState::PlatformProcessing);
        assert_eq!(platform.initiate_calls(), 1);

        let answer = processor.process_purchase(event("sword_of_fire", "T1", "R1"));

        assert_eq!(answer, ProcessingResult::Complete);
        assert_eq!(processor.state(), TransactionState::Completed);
        let result = processor.operation().result().cloned().unwrap();
        assert_eq!(result.transaction_id(), Some("T1"));
        assert_eq!(result.verdict, Some(ValidationVerdict::Ok));
        assert!(processor.is_confirmed());
    }

    #[test]
    fn test_no_validator_is_suppressed_and_completes() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "potion", false);
        processor.initiate(&catalog(&["potion"]));

        let answer = processor.process_purchase(event("potion", "T2", "R2"));
        assert_eq!(answer, ProcessingResult::Complete);
        assert_eq!(processor.operation().result().unwrap().verdict, None);
    }

    #[test]
    fn test_empty_receipt_fails_without_confirm() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "potion", false);
        processor.initiate(&catalog(&["potion"]));

        let answer = processor.process_purchase(event("potion", "T3", ""));

        assert_eq!(answer, ProcessingResult::Pending);
        let failure = processor.operation().error().cloned().unwrap();
        assert_eq!(failure.error, PurchaseError::ReceiptNullOrEmpty);
        assert!(failure.record.is_some());
        assert!(!processor.is_confirmed());
    }

    #[test]
    fn test_failure_verdict_confirms_and_fails() {
        let platform = MockPlatform::new();
        let processor = processor_with(
            &platform,
            "potion",
            false,
            Some(ScriptedValidator::sync(Some(ValidationVerdict::Failure))),
        );
        processor.initiate(&catalog(&["potion"]));

        let answer = processor.process_purchase(event("potion", "T4", "forged"));
        assert_eq!(answer, ProcessingResult::Complete);
        assert_eq!(
            processor.operation().error().map(|f| f.error),
            Some(PurchaseError::ReceiptValidationFailed)
        );
    }

    #[test]
    fn test_not_available_and_fault_never_confirm() {
        for validator in [
            ScriptedValidator::sync(Some(ValidationVerdict::NotAvailable)),
            ScriptedValidator::fault("backend down"),
            ScriptedValidator::panicking(),
        ] {
            let platform = MockPlatform::new();
            let processor = processor_with(&platform, "potion", false, Some(validator));
            processor.initiate(&catalog(&["potion"]));

            let answer = processor.process_purchase(event("potion", "T5", "R5"));
            assert_eq!(answer, ProcessingResult::Pending);
            assert_eq!(
                processor.operation().error().map(|f| f.error),
                Some(PurchaseError::ReceiptValidationNotAvailable)
            );
            assert_eq!(platform.confirm_calls(), 0);
        }
    }

    #[test]
    fn test_async_verdict_confirms_on_owner_thread() {
        let platform = MockPlatform::new();
        let (dispatcher, mut queue) = QueueDispatcher::new();
        let validator = ScriptedValidator::deferred();
        let processor = TransactionProcessor::new(
            "potion",
            false,
            ProcessorContext {
                platform: platform.clone(),
                validator: Some(validator.clone() as Arc<dyn ReceiptValidator>),
                dispatcher: Arc::new(dispatcher),
            },
        );
        processor.initiate(&catalog(&["potion"]));

        let answer = processor.process_purchase(event("potion", "T6", "R6"));
        assert_eq!(answer, ProcessingResult::Pending);
        assert_eq!(processor.state(), TransactionState::Validating);

        let remote = validator.clone();
        std::thread::spawn(move || remote.resolve(Some(ValidationVerdict::Ok)))
            .join()
            .unwrap();
        assert!(!processor.operation().is_done());
        assert_eq!(platform.confirm_calls(), 0);

        assert_eq!(queue.run_pending(), 1);
        assert!(processor.operation().is_completed_successfully());
        assert_eq!(platform.confirm_calls(), 1);
    }

    #[test]
    fn test_attempt_disposed_during_validation_is_not_confirmed() {
        let platform = MockPlatform::new();
        let target: Arc<OnceLock<Weak<TransactionProcessor>>> = Arc::new(OnceLock::new());
        let slot = Arc::clone(&target);
        let validator = move |_: &TransactionRecord| {
            if let Some(processor) = slot.get().and_then(Weak::upgrade) {
                processor.dispose();
            }
            ValidationOperation::completed(Some(ValidationVerdict::Ok))
        };
        let processor = TransactionProcessor::new(
            "potion",
            false,
            ProcessorContext {
                platform: platform.clone(),
                validator: Some(Arc::new(validator) as Arc<dyn ReceiptValidator>),
                dispatcher: Arc::new(InlineDispatcher),
            },
        );
        target.set(Arc::downgrade(&processor)).unwrap();
        processor.initiate(&catalog(&["potion"]));

        let answer = processor.process_purchase(event("potion", "T11", "R11"));

        assert_eq!(answer, ProcessingResult::Pending);
        assert!(!processor.is_confirmed());
        assert_eq!(processor.state(), TransactionState::Failed);
        assert_eq!(
            processor.operation().error().map(|f| f.error),
            Some(PurchaseError::StoreDisposed)
        );
        assert_eq!(platform.confirm_calls(), 0);
    }

    #[test]
    fn test_dispose_while_deferred_skips_confirmation() {
        let platform = MockPlatform::new();
        let (dispatcher, mut queue) = QueueDispatcher::new();
        let validator = ScriptedValidator::deferred();
        let processor = TransactionProcessor::new(
            "potion",
            false,
            ProcessorContext {
                platform: platform.clone(),
                validator: Some(validator.clone() as Arc<dyn ReceiptValidator>),
                dispatcher: Arc::new(dispatcher),
            },
        );
        processor.initiate(&catalog(&["potion"]));
        assert_eq!(
            processor.process_purchase(event("potion", "T12", "R12")),
            ProcessingResult::Pending
        );

        validator.resolve(Some(ValidationVerdict::Ok));
        processor.dispose();
        queue.run_pending();

        assert_eq!(processor.state(), TransactionState::Failed);
        assert!(!processor.is_confirmed());
        assert_eq!(platform.confirm_calls(), 0);
    }

    #[test]
    fn test_unexpected_product_is_declined() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "potion", false);
        processor.initiate(&catalog(&["potion"]));

        let answer = processor.process_purchase(event("shield", "T7", "R7"));
        assert_eq!(answer, ProcessingResult::Pending);
        assert!(processor.record().is_none());
        assert!(!processor.operation().is_done());
    }

    #[test]
    fn test_restored_processor_accepts_without_initiate() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "potion", true);

        let answer = processor.process_purchase(event("potion", "T8", "R8"));
        assert_eq!(answer, ProcessingResult::Complete);
        assert!(processor.operation().result().unwrap().is_restored());
        assert_eq!(platform.initiate_calls(), 0);
    }

    #[test]
    fn test_user_cancel_is_canceled_not_faulted() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "potion", false);
        processor.initiate(&catalog(&["potion"]));

        processor.on_purchase_failed(PlatformFailureReason::UserCancelled);
        assert!(processor.operation().is_canceled());
        assert_eq!(processor.state(), TransactionState::Canceled);

        let declined = self::processor(&platform, "potion", false);
        declined.on_purchase_failed(PlatformFailureReason::PaymentDeclined);
        assert_eq!(
            declined.operation().error().map(|f| f.error),
            Some(PurchaseError::PaymentDeclined)
        );
    }

    #[test]
    fn test_dispose_fails_once_without_platform_calls() {
        let platform = MockPlatform::new();
        let processor = processor(&platform, "potion", false);

        processor.dispose();
        processor.on_purchase_failed(PlatformFailureReason::PaymentDeclined);

        assert_eq!(
            processor.operation().error().map(|f| f.error),
            Some(PurchaseError::StoreDisposed)
        );
        assert_eq!(platform.initiate_calls(), 0);
        assert_eq!(platform.confirm_calls(), 0);
    }

    #[test]
    fn test_second_event_is_not_processed_twice() {
        let platform = MockPlatform::new();
        let processor = processor_with(
            &platform,
            "potion",
            true,
            Some(ScriptedValidator::deferred()),
        );

        assert_eq!(
            processor.process_purchase(event("potion", "T9", "R9")),
            ProcessingResult::Pending
        );
        assert_eq!(
            processor.process_purchase(event("potion", "T10", "R10")),
            ProcessingResult::Pending
        );
        assert_eq!(processor.record().unwrap().transaction_id.as_deref(), Some("T9"));
    }
}
