//! # Operation Registry
//!
//! Holds at most one pending operation per category.
//!
//! ## Slot Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   begin_*(op) ──► slot free?  ──yes──► occupy (id published) ──► Ok     │
//! │                       │                                                 │
//! │                       no ──► Err(existing)   caller joins it            │
//! │                                                                         │
//! │   op finishes ──► release_*(id) ──► id matches? ──► slot free           │
//! │                                      (stale ids are ignored)            │
//! │                                                                         │
//! │   is_pending / is_busy ──► one atomic load, never waits on a lock       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Claims and releases take a short lock on the slot's handle cell; readers
//! that only need to know whether a category is busy look at the occupant
//! word alone.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use iap_core::{Operation, StoreFetchError};

use crate::transaction::TransactionProcessor;

/// Operation returned by `StoreService::initialize`.
pub type InitializeOperation = Operation<(), StoreFetchError>;

/// Operation returned by `StoreService::fetch`.
pub type FetchOperation = Operation<(), StoreFetchError>;

/// Kinds of operations that are mutually exclusive with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Initialize,
    Fetch,
    Purchase,
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 3] = [
        OperationCategory::Initialize,
        OperationCategory::Fetch,
        OperationCategory::Purchase,
    ];
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationCategory::Initialize => write!(f, "initialize"),
            OperationCategory::Fetch => write!(f, "fetch"),
            OperationCategory::Purchase => write!(f, "purchase"),
        }
    }
}

// =============================================================================
// Slot
// =============================================================================

const FREE: u64 = 0;

/// One category's pending operation.
struct Slot<H> {
    /// Id of the occupant, or `FREE`. Operation ids start at 1.
    occupant: AtomicU64,
    handle: Mutex<Option<H>>,
}

impl<H: Clone> Slot<H> {
    fn new() -> Self {
        Slot {
            occupant: AtomicU64::new(FREE),
            handle: Mutex::new(None),
        }
    }

    fn begin(&self, id: u64, handle: H) -> Result<(), H> {
        let mut cell = lock(&self.handle);
        if let Some(existing) = cell.as_ref() {
            return Err(existing.clone());
        }
        *cell = Some(handle);
        self.occupant.store(id, Ordering::Release);
        Ok(())
    }

    fn is_occupied(&self) -> bool {
        self.occupant.load(Ordering::Acquire) != FREE
    }

    fn current(&self) -> Option<H> {
        if !self.is_occupied() {
            return None;
        }
        lock(&self.handle).clone()
    }

    fn release(&self, id: u64) -> bool {
        let mut cell = lock(&self.handle);
        if self.occupant.load(Ordering::Acquire) != id {
            return false;
        }
        self.occupant.store(FREE, Ordering::Release);
        cell.take();
        true
    }

    fn take(&self) -> Option<H> {
        let mut cell = lock(&self.handle);
        self.occupant.store(FREE, Ordering::Release);
        cell.take()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Registry
// =============================================================================

/// Everything a disposal has to force-fail.
pub(crate) struct Drained {
    pub initialize: Option<InitializeOperation>,
    pub fetch: Option<FetchOperation>,
    pub purchase: Option<Arc<TransactionProcessor>>,
}

/// At most one pending Initialize, Fetch and Purchase.
pub struct OperationRegistry {
    initialize: Slot<InitializeOperation>,
    fetch: Slot<FetchOperation>,
    purchase: Slot<Arc<TransactionProcessor>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        OperationRegistry {
            initialize: Slot::new(),
            fetch: Slot::new(),
            purchase: Slot::new(),
        }
    }

    // =========================================================================
    // Begin
    // =========================================================================

    /// Claims the Initialize slot, or returns the operation already in it.
    pub fn begin_initialize(&self, op: InitializeOperation) -> Result<(), InitializeOperation> {
        let id = op.id();
        self.initialize.begin(id, op)?;
        trace!(op_id = id, category = %OperationCategory::Initialize, "Slot claimed");
        Ok(())
    }

    /// Claims the Fetch slot, or returns the operation already in it.
    pub fn begin_fetch(&self, op: FetchOperation) -> Result<(), FetchOperation> {
        let id = op.id();
        self.fetch.begin(id, op)?;
        trace!(op_id = id, category = %OperationCategory::Fetch, "Slot claimed");
        Ok(())
    }

    /// Claims the Purchase slot, or returns the processor already in it.
    pub fn begin_purchase(
        &self,
        processor: Arc<TransactionProcessor>,
    ) -> Result<(), Arc<TransactionProcessor>> {
        let id = processor.operation().id();
        let product_id = processor.product_id().to_string();
        self.purchase.begin(id, processor)?;
        trace!(op_id = id, %product_id, category = %OperationCategory::Purchase, "Slot claimed");
        Ok(())
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Frees the Initialize slot if `op_id` still occupies it.
    pub fn release_initialize(&self, op_id: u64) -> bool {
        self.log_release(OperationCategory::Initialize, op_id, self.initialize.release(op_id))
    }

    /// Frees the Fetch slot if `op_id` still occupies it.
    pub fn release_fetch(&self, op_id: u64) -> bool {
        self.log_release(OperationCategory::Fetch, op_id, self.fetch.release(op_id))
    }

    /// Frees the Purchase slot if `op_id` still occupies it.
    pub fn release_purchase(&self, op_id: u64) -> bool {
        self.log_release(OperationCategory::Purchase, op_id, self.purchase.release(op_id))
    }

    fn log_release(&self, category: OperationCategory, op_id: u64, released: bool) -> bool {
        if released {
            trace!(op_id, %category, "Slot released");
        } else {
            debug!(op_id, %category, "Ignoring release of an operation that does not hold the slot");
        }
        released
    }

    /// Empties every slot and hands back what was in them.
    pub(crate) fn drain(&self) -> Drained {
        Drained {
            initialize: self.initialize.take(),
            fetch: self.fetch.take(),
            purchase: self.purchase.take(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn pending_initialize(&self) -> Option<InitializeOperation> {
        self.initialize.current()
    }

    pub fn pending_fetch(&self) -> Option<FetchOperation> {
        self.fetch.current()
    }

    /// The processor of the purchase in flight, if any.
    pub fn active_processor(&self) -> Option<Arc<TransactionProcessor>> {
        self.purchase.current()
    }

    /// Returns true if an operation of `category` is pending.
    pub fn is_pending(&self, category: OperationCategory) -> bool {
        match category {
            OperationCategory::Initialize => self.initialize.is_occupied(),
            OperationCategory::Fetch => self.fetch.is_occupied(),
            OperationCategory::Purchase => self.purchase.is_occupied(),
        }
    }

    /// Returns true if any category is pending.
    pub fn is_busy(&self) -> bool {
        OperationCategory::ALL
            .iter()
            .any(|category| self.is_pending(*category))
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("initialize", &self.initialize.occupant.load(Ordering::Relaxed))
            .field("fetch", &self.fetch.occupant.load(Ordering::Relaxed))
            .field("purchase", &self.purchase.occupant.load(Ordering::Relaxed))
            .finish()
    }
}
