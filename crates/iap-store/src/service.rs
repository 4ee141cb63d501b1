//! # Store Service
//!
//! Public facade of the store: initialize, fetch and purchase, each returning
//! an [`Operation`](iap_core::Operation) the caller can chain on or await.
//!
//! ## Sequencing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        purchase("sword_of_fire")                        │
//! │                                                                         │
//! │   validate id ─► claim Purchase slot ──(taken, same product)─► join     │
//! │        │               │             ──(taken, other product)─► Busy    │
//! │        ▼               ▼                                                │
//! │   StoreError     emit PurchaseInitiated                                 │
//! │                        │                                                │
//! │                        ▼                                                │
//! │            Initialize (cached / joined / started)                       │
//! │                        │ continue_with                                  │
//! │          failed ◄──────┤                                                │
//! │   purchase fails       ▼                                                │
//! │   (mapped error)  pending Fetch? ──yes──► continue_with ─┐              │
//! │                        │ no                              │              │
//! │                        ▼                                 ▼              │
//! │                   processor.initiate(catalog snapshot)                  │
//! │                                                                         │
//! │   Nothing blocks: every "then" is a continuation on the previous op.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bookkeeping
//! Each operation gets a continuation, attached before any platform call,
//! that releases its registry slot and then publishes a [`StoreEvent`].
//! Disposal (explicit or on drop) empties the registry and force-fails
//! whatever was in it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use iap_core::validation::{validate_product_definitions, validate_product_id};
use iap_core::{
    OperationError, Product, ProductCatalog, ProductDefinition, PurchaseError, PurchaseFailure,
    PurchaseResult, StoreFetchError,
};

use crate::config::StoreConfig;
use crate::dispatch::{InlineDispatcher, OwnerDispatcher};
use crate::error::{StoreError, StoreResult};
use crate::events::{EventHub, PurchaseFailedEvent, StoreEvent, StoreObserver};
use crate::listener::NotificationBridge;
use crate::platform::{
    FetchFailedCallback, ProductsCallback, ReceiptValidator, StoreListener, StorePlatform,
};
use crate::registry::{FetchOperation, InitializeOperation, OperationCategory, OperationRegistry};
use crate::transaction::{ProcessorContext, PurchaseOperation, TransactionProcessor};

/// Awaited outcome of an Initialize or Fetch.
pub type FetchOutcome = Result<(), OperationError<StoreFetchError>>;

/// Awaited outcome of a Purchase.
pub type PurchaseOutcome = Result<PurchaseResult, OperationError<PurchaseFailure>>;

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`StoreService`].
pub struct StoreServiceBuilder {
    config: StoreConfig,
    platform: Arc<dyn StorePlatform>,
    validator: Option<Arc<dyn ReceiptValidator>>,
    dispatcher: Arc<dyn OwnerDispatcher>,
}

impl StoreServiceBuilder {
    /// Sets the receipt validator. Without one every receipt is accepted.
    pub fn validator(mut self, validator: Arc<dyn ReceiptValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets how validator results get back to the owner thread.
    /// Defaults to [`InlineDispatcher`].
    pub fn dispatcher(mut self, dispatcher: Arc<dyn OwnerDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Validates the configuration and creates the service.
    pub fn build(self) -> StoreResult<StoreService> {
        self.config.validate()?;

        let validator = if self.config.store.validate_receipts {
            self.validator
        } else {
            if self.validator.is_some() {
                info!("Receipt validation disabled by configuration");
            }
            None
        };

        let core = Arc::new(StoreCore {
            events: EventHub::new(self.config.store.event_capacity),
            context: ProcessorContext {
                platform: self.platform,
                validator,
                dispatcher: self.dispatcher,
            },
            config: self.config,
            registry: OperationRegistry::new(),
            catalog: RwLock::new(Arc::new(ProductCatalog::new())),
            initialized: OnceLock::new(),
            disposed: AtomicBool::new(false),
        });

        info!(
            store = %core.config.store.name,
            products = core.config.products.len(),
            validating = core.context.validator.is_some(),
            "Store created"
        );
        Ok(StoreService { core })
    }
}

// =============================================================================
// Store Service
// =============================================================================

/// In-app purchase store.
///
/// Intended to be driven from one owner thread; platform callbacks and
/// validator results may arrive from others. Dropping the service disposes it.
pub struct StoreService {
    core: Arc<StoreCore>,
}

impl StoreService {
    /// Starts building a store over `platform`.
    pub fn builder(config: StoreConfig, platform: Arc<dyn StorePlatform>) -> StoreServiceBuilder {
        StoreServiceBuilder {
            config,
            platform,
            validator: None,
            dispatcher: Arc::new(InlineDispatcher),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Initializes the store with the configured products.
    ///
    /// Returns the pending initialization if one is running, or the cached
    /// completed one once the store is initialized.
    pub fn initialize(&self) -> StoreResult<InitializeOperation> {
        self.core.ensure_live()?;
        Ok(self.core.start_initialize())
    }

    /// Requests `additional` products from the platform, initializing first
    /// if needed. Joins a fetch that is already pending.
    pub fn fetch(&self, additional: Vec<ProductDefinition>) -> StoreResult<FetchOperation> {
        self.core.ensure_live()?;
        validate_product_definitions(&additional)?;
        Ok(self.core.start_fetch(additional))
    }

    /// Buys `product_id`.
    ///
    /// ## Errors
    /// - `InvalidProductId`: malformed id
    /// - `Busy`: a purchase of another product (or a restore) is in flight
    /// - `Disposed`: the store was disposed
    ///
    /// A second call for the product already in flight returns the same
    /// operation.
    pub fn purchase(&self, product_id: &str) -> StoreResult<PurchaseOperation> {
        self.core.ensure_live()?;
        validate_product_id(product_id)?;
        self.core.start_purchase(product_id)
    }

    /// Force-fails every pending operation and ignores later platform
    /// callbacks. Idempotent.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    // =========================================================================
    // Async Conveniences
    // =========================================================================

    pub async fn initialize_async(&self) -> StoreResult<FetchOutcome> {
        let op = self.initialize()?;
        Ok(op.wait_async().await)
    }

    pub async fn fetch_async(&self, additional: Vec<ProductDefinition>) -> StoreResult<FetchOutcome> {
        let op = self.fetch(additional)?;
        Ok(op.wait_async().await)
    }

    pub async fn purchase_async(&self, product_id: &str) -> StoreResult<PurchaseOutcome> {
        let op = self.purchase(product_id)?;
        Ok(op.wait_async().await)
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn is_initialized(&self) -> bool {
        self.core.initialized.get().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Returns true if any operation is pending.
    pub fn is_busy(&self) -> bool {
        self.core.registry.is_busy()
    }

    pub fn is_pending(&self, category: OperationCategory) -> bool {
        self.core.registry.is_pending(category)
    }

    /// Current catalog snapshot.
    pub fn products(&self) -> Arc<ProductCatalog> {
        self.core.catalog()
    }

    /// The purchase in flight, explicit or restored.
    pub fn pending_purchase(&self) -> Option<PurchaseOperation> {
        self.core
            .registry
            .active_processor()
            .map(|processor| processor.operation().clone())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.core.config
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribes to store events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.core.events.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn StoreObserver>) {
        self.core.events.add_observer(observer);
    }
}

impl Drop for StoreService {
    fn drop(&mut self) {
        self.core.dispose();
    }
}

impl fmt::Debug for StoreService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreService")
            .field("store", &self.core.config.store.name)
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.is_disposed())
            .field("registry", &self.core.registry)
            .finish()
    }
}

// =============================================================================
// Store Core
// =============================================================================

/// State shared by the service, its continuations and the notification bridge.
pub(crate) struct StoreCore {
    config: StoreConfig,
    context: ProcessorContext,
    registry: OperationRegistry,
    catalog: RwLock<Arc<ProductCatalog>>,
    /// Completed initialization, handed to every later `initialize` call.
    initialized: OnceLock<InitializeOperation>,
    disposed: AtomicBool,
    events: EventHub,
}

impl StoreCore {
    pub(crate) fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> StoreResult<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn catalog(&self) -> Arc<ProductCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace_catalog(&self, catalog: ProductCatalog) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }

    // =========================================================================
    // Initialize
    // =========================================================================

    fn start_initialize(self: &Arc<Self>) -> InitializeOperation {
        if self.is_disposed() {
            return InitializeOperation::faulted(StoreFetchError::StoreDisposed);
        }
        if let Some(done) = self.initialized.get() {
            return done.clone();
        }

        let op = InitializeOperation::pending();
        if let Err(pending) = self.registry.begin_initialize(op.clone()) {
            debug!(op_id = pending.id(), "Joining pending initialization");
            return pending;
        }

        let core = Arc::downgrade(self);
        op.continue_with(move |op| {
            if let Some(core) = core.upgrade() {
                core.on_initialize_finished(op);
            }
        });

        info!(
            op_id = op.id(),
            store = %self.config.store.name,
            products = self.config.products.len(),
            "Initializing store"
        );
        let listener: Arc<dyn StoreListener> =
            Arc::new(NotificationBridge::new(Arc::downgrade(self)));
        self.context
            .platform
            .initialize(&self.config.products, listener);

        op.finish_initiation();
        op
    }

    pub(crate) fn complete_initialization(&self, products: Vec<Product>) {
        let product_count = products.len();
        self.replace_catalog(products.into_iter().collect());

        match self.registry.pending_initialize() {
            Some(op) => {
                op.try_complete(());
            }
            None => {
                if self.initialized.set(InitializeOperation::completed(())).is_ok() {
                    info!(product_count, "Platform initialized the store unprompted");
                    self.events.emit(StoreEvent::Initialized { product_count });
                } else {
                    debug!(product_count, "Platform refreshed the catalog");
                }
            }
        }
    }

    pub(crate) fn fail_initialization(&self, error: StoreFetchError) {
        match self.registry.pending_initialize() {
            Some(op) => {
                op.try_fail(error);
            }
            None => {
                warn!(%error, "Initialization failure with no initialization pending");
                self.events.emit(StoreEvent::InitializationFailed { error });
            }
        }
    }

    fn on_initialize_finished(&self, op: &InitializeOperation) {
        // Cached before the slot is released.
        if op.is_completed_successfully() {
            let _ = self.initialized.set(op.clone());
        }
        self.registry.release_initialize(op.id());

        match op.outcome() {
            Some(Ok(())) => {
                let product_count = self.catalog().len();
                info!(op_id = op.id(), product_count, "Store initialized");
                self.events.emit(StoreEvent::Initialized { product_count });
            }
            Some(Err(OperationError::Faulted(error))) => {
                warn!(op_id = op.id(), %error, "Store initialization failed");
                self.events.emit(StoreEvent::InitializationFailed { error });
            }
            Some(Err(OperationError::Canceled)) | None => {}
        }
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    fn start_fetch(self: &Arc<Self>, additional: Vec<ProductDefinition>) -> FetchOperation {
        let op = FetchOperation::pending();
        if let Err(pending) = self.registry.begin_fetch(op.clone()) {
            debug!(op_id = pending.id(), "Joining pending fetch");
            return pending;
        }

        let core = Arc::downgrade(self);
        op.continue_with(move |op| {
            if let Some(core) = core.upgrade() {
                core.on_fetch_finished(op);
            }
        });

        let core = Arc::downgrade(self);
        let fetch = op.clone();
        self.start_initialize().continue_with(move |init| {
            let Some(core) = core.upgrade() else {
                fetch.try_fail(StoreFetchError::StoreDisposed);
                return;
            };
            match init.outcome() {
                Some(Ok(())) => core.request_products(&fetch, &additional),
                Some(Err(OperationError::Faulted(error))) => {
                    fetch.try_fail(error);
                }
                Some(Err(OperationError::Canceled)) | None => {
                    fetch.try_fail(StoreFetchError::Unknown);
                }
            }
        });

        op.finish_initiation();
        op
    }

    fn request_products(self: &Arc<Self>, fetch: &FetchOperation, additional: &[ProductDefinition]) {
        if fetch.is_done() {
            return;
        }

        let core = Arc::downgrade(self);
        let fetched = fetch.clone();
        let on_ok: ProductsCallback = Box::new(move |products| {
            if fetched.is_done() {
                return;
            }
            if let Some(core) = core.upgrade() {
                let merged = core.catalog().merged(products);
                core.replace_catalog(merged);
            }
            fetched.try_complete(());
        });

        let failed = fetch.clone();
        let on_fail: FetchFailedCallback = Box::new(move |reason| {
            failed.try_fail(reason.into());
        });

        info!(op_id = fetch.id(), count = additional.len(), "Fetching additional products");
        self.context
            .platform
            .fetch_additional_products(additional, on_ok, on_fail);
    }

    fn on_fetch_finished(&self, op: &FetchOperation) {
        self.registry.release_fetch(op.id());

        match op.outcome() {
            Some(Ok(())) => {
                let product_count = self.catalog().len();
                info!(op_id = op.id(), product_count, "Products fetched");
                self.events.emit(StoreEvent::FetchCompleted { product_count });
            }
            Some(Err(OperationError::Faulted(error))) => {
                warn!(op_id = op.id(), %error, "Product fetch failed");
                self.events.emit(StoreEvent::FetchFailed { error });
            }
            Some(Err(OperationError::Canceled)) | None => {}
        }
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    fn start_purchase(self: &Arc<Self>, product_id: &str) -> StoreResult<PurchaseOperation> {
        let processor = TransactionProcessor::new(product_id, false, self.context.clone());
        if let Err(active) = self.registry.begin_purchase(processor.clone()) {
            if !active.is_restored() && active.product_id() == product_id {
                debug!(
                    attempt_id = %active.attempt_id(),
                    %product_id,
                    "Joining pending purchase"
                );
                return Ok(active.operation().clone());
            }
            warn!(
                %product_id,
                pending_product = %active.product_id(),
                restored = active.is_restored(),
                "Purchase rejected, store is busy"
            );
            return Err(StoreError::Busy {
                pending_product: active.product_id().to_string(),
            });
        }

        self.track_purchase(&processor);

        let core = Arc::downgrade(self);
        let driver = Arc::clone(&processor);
        self.start_initialize().continue_with(move |init| {
            let Some(core) = core.upgrade() else {
                driver.dispose();
                return;
            };
            match init.outcome() {
                Some(Ok(())) => core.after_initialize(driver),
                Some(Err(OperationError::Faulted(error))) => driver.abort(PurchaseError::from(error)),
                Some(Err(OperationError::Canceled)) | None => {
                    driver.abort(PurchaseError::StoreNotInitialized)
                }
            }
        });

        let op = processor.operation().clone();
        op.finish_initiation();
        Ok(op)
    }

    fn after_initialize(self: &Arc<Self>, processor: Arc<TransactionProcessor>) {
        match self.registry.pending_fetch() {
            Some(fetch) => {
                debug!(
                    attempt_id = %processor.attempt_id(),
                    op_id = fetch.id(),
                    "Purchase waiting for pending fetch"
                );
                let core = Arc::downgrade(self);
                // Fetch failures only mean fewer products; the catalog
                // lookup decides whether the purchase can go ahead.
                fetch.continue_with(move |_| match core.upgrade() {
                    Some(core) => processor.initiate(&core.catalog()),
                    None => processor.dispose(),
                });
            }
            None => processor.initiate(&self.catalog()),
        }
    }

    /// Registers a restored processor for a purchase the platform delivered
    /// with nothing in flight. Returns the active processor instead if one
    /// appeared meanwhile.
    pub(crate) fn adopt_restored(self: &Arc<Self>, product_id: &str) -> Arc<TransactionProcessor> {
        let processor = TransactionProcessor::new(product_id, true, self.context.clone());
        match self.registry.begin_purchase(processor.clone()) {
            Ok(()) => {
                info!(
                    attempt_id = %processor.attempt_id(),
                    %product_id,
                    "Restoring purchase delivered by the platform"
                );
                self.track_purchase(&processor);
                processor.operation().finish_initiation();
                processor
            }
            Err(active) => active,
        }
    }

    fn track_purchase(self: &Arc<Self>, processor: &Arc<TransactionProcessor>) {
        let core = Arc::downgrade(self);
        let tracked = Arc::downgrade(processor);
        let product_id = processor.product_id().to_string();
        let restored = processor.is_restored();

        processor.operation().continue_with(move |op| {
            if let Some(core) = core.upgrade() {
                core.on_purchase_finished(op, product_id, restored, &tracked);
            }
        });

        self.events.emit(StoreEvent::PurchaseInitiated {
            product_id: processor.product_id().to_string(),
            restored,
        });
    }

    fn on_purchase_finished(
        &self,
        op: &PurchaseOperation,
        product_id: String,
        restored: bool,
        processor: &Weak<TransactionProcessor>,
    ) {
        self.registry.release_purchase(op.id());

        let event = match op.outcome() {
            Some(Ok(result)) => StoreEvent::PurchaseCompleted { result },
            Some(Err(OperationError::Faulted(failure))) => StoreEvent::PurchaseFailed {
                failure: PurchaseFailedEvent {
                    product_id: failure.product_id,
                    error: failure.error,
                    restored,
                    record: failure.record,
                },
            },
            Some(Err(OperationError::Canceled)) => StoreEvent::PurchaseFailed {
                failure: PurchaseFailedEvent {
                    product_id,
                    error: PurchaseError::UserCanceled,
                    restored,
                    record: processor
                        .upgrade()
                        .and_then(|processor| processor.record().cloned()),
                },
            },
            None => return,
        };
        self.events.emit(event);
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(store = %self.config.store.name, "Disposing store");

        let drained = self.registry.drain();
        if let Some(op) = drained.initialize {
            op.try_fail(StoreFetchError::StoreDisposed);
        }
        if let Some(op) = drained.fetch {
            op.try_fail(StoreFetchError::StoreDisposed);
        }
        if let Some(processor) = drained.purchase {
            processor.dispose();
        }
    }
}
