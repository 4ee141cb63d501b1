//! Shared fixtures for the unit tests: a recording platform, scripted
//! validators and small builders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use iap_core::{Product, ProductCatalog, ProductDefinition, ProductKind, TransactionRecord};
use iap_core::ValidationVerdict;

use crate::dispatch::InlineDispatcher;
use crate::platform::{
    FetchFailedCallback, InitializationFailureReason, PlatformFailureReason, ProcessingResult,
    ProductsCallback, PurchaseEvent, ReceiptValidator, StoreListener, StorePlatform,
    ValidationFault, ValidationOperation,
};
use crate::transaction::{ProcessorContext, TransactionProcessor};

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Builders
// =============================================================================

pub fn product(id: &str) -> Product {
    Product::new(ProductDefinition::new(id, ProductKind::Consumable))
}

pub fn catalog(ids: &[&str]) -> ProductCatalog {
    ids.iter().map(|id| product(id)).collect()
}

pub fn event(product_id: &str, transaction_id: &str, receipt: &str) -> PurchaseEvent {
    PurchaseEvent {
        product_id: product_id.to_string(),
        transaction_id: Some(transaction_id.to_string()),
        receipt: Some(receipt.to_string()),
        store_id: "TestStore".to_string(),
    }
}

pub fn processor(
    platform: &Arc<MockPlatform>,
    product_id: &str,
    restored: bool,
) -> Arc<TransactionProcessor> {
    processor_with(platform, product_id, restored, None)
}

pub fn processor_with(
    platform: &Arc<MockPlatform>,
    product_id: &str,
    restored: bool,
    validator: Option<Arc<ScriptedValidator>>,
) -> Arc<TransactionProcessor> {
    let validator = validator.map(|validator| validator as Arc<dyn ReceiptValidator>);
    TransactionProcessor::new(
        product_id,
        restored,
        ProcessorContext {
            platform: platform.clone(),
            validator,
            dispatcher: Arc::new(InlineDispatcher),
        },
    )
}

// =============================================================================
// Mock Platform
// =============================================================================

/// Records every call the store makes and lets tests play the platform side.
#[derive(Default)]
pub struct MockPlatform {
    listener: Mutex<Option<Arc<dyn StoreListener>>>,
    /// Products reported synchronously from `initialize`, if set.
    auto_initialize: Mutex<Option<Vec<Product>>>,
    initialize_calls: AtomicUsize,
    initiated: Mutex<Vec<String>>,
    confirm_calls: AtomicUsize,
    fetch_requests: Mutex<Vec<(ProductsCallback, FetchFailedCallback)>>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A platform that reports `ids` as soon as it is initialized.
    pub fn with_products(ids: &[&str]) -> Arc<Self> {
        let platform = Self::default();
        *platform.auto_initialize.lock().unwrap() =
            Some(ids.iter().map(|id| product(id)).collect());
        Arc::new(platform)
    }

    pub fn listener(&self) -> Arc<dyn StoreListener> {
        self.listener
            .lock()
            .unwrap()
            .clone()
            .expect("store never called initialize")
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn initiate_calls(&self) -> usize {
        self.initiated.lock().unwrap().len()
    }

    pub fn initiated(&self) -> Vec<String> {
        self.initiated.lock().unwrap().clone()
    }

    /// Explicit confirms plus `Complete` answers seen through [`deliver`](Self::deliver).
    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_requests.lock().unwrap().len()
    }

    // =========================================================================
    // Platform-side actions
    // =========================================================================

    pub fn report_initialized(&self, ids: &[&str]) {
        self.listener()
            .on_initialized(ids.iter().map(|id| product(id)).collect());
    }

    pub fn report_initialize_failed(&self, reason: InitializationFailureReason) {
        self.listener().on_initialize_failed(reason);
    }

    /// Delivers a paid purchase, counting a `Complete` answer as a confirm.
    pub fn deliver(&self, event: PurchaseEvent) -> ProcessingResult {
        let answer = self.listener().process_purchase(event);
        if answer == ProcessingResult::Complete {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        }
        answer
    }

    pub fn report_purchase_failed(&self, product_id: Option<&str>, reason: PlatformFailureReason) {
        self.listener().on_purchase_failed(product_id, reason);
    }

    /// Answers the oldest outstanding fetch with `ids`.
    pub fn complete_fetch(&self, ids: &[&str]) {
        let (on_ok, _) = self.fetch_requests.lock().unwrap().remove(0);
        on_ok(ids.iter().map(|id| product(id)).collect());
    }

    /// Fails the oldest outstanding fetch.
    pub fn fail_fetch(&self, reason: InitializationFailureReason) {
        let (_, on_fail) = self.fetch_requests.lock().unwrap().remove(0);
        on_fail(reason);
    }
}

impl StorePlatform for MockPlatform {
    fn initialize(&self, _products: &[ProductDefinition], listener: Arc<dyn StoreListener>) {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock().unwrap() = Some(listener.clone());

        let auto = self.auto_initialize.lock().unwrap().clone();
        if let Some(products) = auto {
            listener.on_initialized(products);
        }
    }

    fn initiate_purchase(&self, product: &Product) {
        self.initiated.lock().unwrap().push(product.id().to_string());
    }

    fn confirm_pending_purchase(&self, _record: &TransactionRecord) {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn fetch_additional_products(
        &self,
        _products: &[ProductDefinition],
        on_ok: ProductsCallback,
        on_fail: FetchFailedCallback,
    ) {
        self.fetch_requests.lock().unwrap().push((on_ok, on_fail));
    }
}

// =============================================================================
// Scripted Validator
// =============================================================================

enum Script {
    Sync(Option<ValidationVerdict>),
    Fault(String),
    Panic,
    Deferred,
}

/// Validator whose answer is fixed up front, or supplied later for
/// [`ScriptedValidator::deferred`].
pub struct ScriptedValidator {
    script: Script,
    calls: AtomicUsize,
    outstanding: Mutex<Vec<ValidationOperation>>,
}

impl ScriptedValidator {
    fn scripted(script: Script) -> Arc<Self> {
        Arc::new(ScriptedValidator {
            script,
            calls: AtomicUsize::new(0),
            outstanding: Mutex::new(Vec::new()),
        })
    }

    pub fn sync(verdict: Option<ValidationVerdict>) -> Arc<Self> {
        Self::scripted(Script::Sync(verdict))
    }

    pub fn fault(message: &str) -> Arc<Self> {
        Self::scripted(Script::Fault(message.to_string()))
    }

    pub fn panicking() -> Arc<Self> {
        Self::scripted(Script::Panic)
    }

    pub fn deferred() -> Arc<Self> {
        Self::scripted(Script::Deferred)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Completes every outstanding deferred validation.
    pub fn resolve(&self, verdict: Option<ValidationVerdict>) {
        let outstanding: Vec<_> = self.outstanding.lock().unwrap().drain(..).collect();
        for op in outstanding {
            op.try_complete(verdict);
        }
    }
}

impl ReceiptValidator for ScriptedValidator {
    fn validate(&self, _record: &TransactionRecord) -> ValidationOperation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Sync(verdict) => ValidationOperation::completed(*verdict),
            Script::Fault(message) => ValidationOperation::faulted(ValidationFault(message.clone())),
            Script::Panic => panic!("validator crashed"),
            Script::Deferred => {
                let op = ValidationOperation::pending();
                op.finish_initiation();
                self.outstanding.lock().unwrap().push(op.clone());
                op
            }
        }
    }
}
