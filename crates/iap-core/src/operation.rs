//! # Operation Primitive
//!
//! A single-assignment, cancelable, failable result shared between the code
//! that starts some work and everyone interested in its outcome.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Operation<T, E> Lifecycle                         │
//! │                                                                         │
//! │                      try_complete ──► Completed(T)                      │
//! │                    ╱                                                    │
//! │   Running ──CAS──► Publishing ──── try_fail ────► Faulted(E)            │
//! │                    ╲                                                    │
//! │                      try_cancel ───► Canceled                           │
//! │                                                                         │
//! │  • The CAS on the status word picks exactly one winner                  │
//! │  • Only the winner writes the outcome, then publishes the final status  │
//! │  • The winner signals the wait handle and drains continuations          │
//! │  • Losers return false and touch nothing                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consuming an Operation
//! - **Continuations** (default): [`Operation::continue_with`] never blocks the
//!   calling thread. The callback runs on whichever thread wins the terminal
//!   transition, or immediately if the operation is already finished.
//! - **Blocking**: [`Operation::join`] / [`Operation::wait_timeout`] use a
//!   lazily created [`WaitHandle`].
//! - **Async**: [`Operation::wait_async`] bridges into a tokio oneshot.
//!
//! ## Example
//! ```rust
//! use iap_core::operation::{Operation, OperationStatus};
//!
//! let op: Operation<u32, String> = Operation::pending();
//! op.continue_with(|op| assert_eq!(op.result(), Some(&7)));
//!
//! assert!(op.try_complete(7));
//! assert!(!op.try_fail("too late".to_string()));
//! assert_eq!(op.status(), OperationStatus::Completed);
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{error, trace};

use crate::error::OperationError;

// =============================================================================
// Status Word
// =============================================================================

const STATE_RUNNING: u8 = 0;
/// Transient: a winner has claimed the transition but not yet published it.
const STATE_PUBLISHING: u8 = 1;
const STATE_COMPLETED: u8 = 2;
const STATE_FAULTED: u8 = 3;
const STATE_CANCELED: u8 = 4;

/// Monotonic status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Work is still in flight.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Faulted,
    /// Finished without a result or error.
    Canceled,
}

impl OperationStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_COMPLETED => OperationStatus::Completed,
            STATE_FAULTED => OperationStatus::Faulted,
            STATE_CANCELED => OperationStatus::Canceled,
            _ => OperationStatus::Running,
        }
    }

    /// Returns true for every status except `Running`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Running => write!(f, "running"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Faulted => write!(f, "faulted"),
            OperationStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Source of operation ids (log correlation only).
static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Wait Handle
// =============================================================================

/// Manual-reset event used for blocking waits.
///
/// Created on first use by [`Operation::wait_handle`]; most operations never
/// need one.
#[derive(Debug, Default)]
pub struct WaitHandle {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl WaitHandle {
    fn signal(&self) {
        *lock(&self.signaled) = true;
        self.condvar.notify_all();
    }

    /// Returns true once the owning operation has finished.
    pub fn is_signaled(&self) -> bool {
        *lock(&self.signaled)
    }

    /// Blocks until signaled.
    pub fn wait(&self) {
        let mut signaled = lock(&self.signaled);
        while !*signaled {
            signaled = self
                .condvar
                .wait(signaled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until signaled or the timeout elapses. Returns the signaled state.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signaled = lock(&self.signaled);
        let (signaled, _) = self
            .condvar
            .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        *signaled
    }
}

// =============================================================================
// Operation
// =============================================================================

enum Outcome<T, E> {
    Completed(T),
    Faulted(E),
    Canceled,
}

type Continuation<T, E> = Box<dyn FnOnce(&Operation<T, E>) + Send>;

struct Shared<T, E> {
    id: u64,
    state: AtomicU8,
    outcome: OnceLock<Outcome<T, E>>,
    /// Thread that created the operation; `None` for pre-completed ones.
    initiator: Option<ThreadId>,
    /// Cleared by [`Operation::finish_initiation`].
    initiating: AtomicBool,
    completed_synchronously: AtomicBool,
    /// `None` once drained by the winning transition.
    continuations: Mutex<Option<Vec<Continuation<T, E>>>>,
    wait_handle: OnceLock<WaitHandle>,
}

/// Single-assignment result with continuations.
///
/// Cloning is cheap and every clone observes the same outcome.
pub struct Operation<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Operation<T, E> {
    fn clone(&self) -> Self {
        Operation {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for Operation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<T, E> Operation<T, E> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Creates a running operation owned by the calling thread.
    ///
    /// Call [`finish_initiation`](Self::finish_initiation) when the initiating
    /// call returns so later completions are not reported as synchronous.
    pub fn pending() -> Self {
        Operation {
            shared: Arc::new(Shared {
                id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(STATE_RUNNING),
                outcome: OnceLock::new(),
                initiator: Some(thread::current().id()),
                initiating: AtomicBool::new(true),
                completed_synchronously: AtomicBool::new(false),
                continuations: Mutex::new(Some(Vec::new())),
                wait_handle: OnceLock::new(),
            }),
        }
    }

    /// Creates an operation that already completed with `value`.
    pub fn completed(value: T) -> Self {
        Self::finished(STATE_COMPLETED, Outcome::Completed(value))
    }

    /// Creates an operation that already faulted with `error`.
    pub fn faulted(error: E) -> Self {
        Self::finished(STATE_FAULTED, Outcome::Faulted(error))
    }

    /// Creates an operation that is already canceled.
    pub fn canceled() -> Self {
        Self::finished(STATE_CANCELED, Outcome::Canceled)
    }

    fn finished(state: u8, outcome: Outcome<T, E>) -> Self {
        Operation {
            shared: Arc::new(Shared {
                id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(state),
                outcome: OnceLock::from(outcome),
                initiator: None,
                initiating: AtomicBool::new(false),
                completed_synchronously: AtomicBool::new(true),
                continuations: Mutex::new(None),
                wait_handle: OnceLock::new(),
            }),
        }
    }

    /// Marks the end of the initiating call.
    pub fn finish_initiation(&self) {
        self.shared.initiating.store(false, Ordering::Release);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Process-unique id, used in logs.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current status. `Running` until the outcome is fully published.
    pub fn status(&self) -> OperationStatus {
        OperationStatus::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// Returns true once the operation reached a terminal status.
    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_completed_successfully(&self) -> bool {
        self.status() == OperationStatus::Completed
    }

    pub fn is_faulted(&self) -> bool {
        self.status() == OperationStatus::Faulted
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == OperationStatus::Canceled
    }

    /// True when the terminal transition happened inside the initiating call
    /// on the initiating thread.
    pub fn completed_synchronously(&self) -> bool {
        self.is_done() && self.shared.completed_synchronously.load(Ordering::Relaxed)
    }

    /// The result, once completed.
    pub fn result(&self) -> Option<&T> {
        match self.published()? {
            Outcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// The error, once faulted.
    pub fn error(&self) -> Option<&E> {
        match self.published()? {
            Outcome::Faulted(err) => Some(err),
            _ => None,
        }
    }

    /// Cloned outcome, or `None` while running.
    pub fn outcome(&self) -> Option<Result<T, OperationError<E>>>
    where
        T: Clone,
        E: Clone,
    {
        Some(match self.published()? {
            Outcome::Completed(value) => Ok(value.clone()),
            Outcome::Faulted(err) => Err(OperationError::Faulted(err.clone())),
            Outcome::Canceled => Err(OperationError::Canceled),
        })
    }

    fn published(&self) -> Option<&Outcome<T, E>> {
        if !self.is_done() {
            return None;
        }
        self.shared.outcome.get()
    }

    // =========================================================================
    // Terminal Transitions
    // =========================================================================

    /// Completes the operation. Returns false if it already finished.
    pub fn try_complete(&self, value: T) -> bool {
        self.transition(STATE_COMPLETED, Outcome::Completed(value))
    }

    /// Faults the operation. Returns false if it already finished.
    pub fn try_fail(&self, error: E) -> bool {
        self.transition(STATE_FAULTED, Outcome::Faulted(error))
    }

    /// Cancels the operation. Returns false if it already finished.
    pub fn try_cancel(&self) -> bool {
        self.transition(STATE_CANCELED, Outcome::Canceled)
    }

    fn transition(&self, terminal: u8, outcome: Outcome<T, E>) -> bool {
        let shared = &*self.shared;

        if shared
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_PUBLISHING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        let synchronous = shared.initiating.load(Ordering::Acquire)
            && shared.initiator == Some(thread::current().id());
        shared
            .completed_synchronously
            .store(synchronous, Ordering::Relaxed);

        // Only the CAS winner gets here, so the cell is still empty.
        let _ = shared.outcome.set(outcome);
        shared.state.store(terminal, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        trace!(
            op_id = shared.id,
            status = %OperationStatus::from_raw(terminal),
            synchronous,
            "Operation finished"
        );

        if let Some(handle) = shared.wait_handle.get() {
            handle.signal();
        }

        let queued = lock(&shared.continuations).take().unwrap_or_default();
        for continuation in queued {
            self.invoke(continuation);
        }

        true
    }

    // =========================================================================
    // Continuations
    // =========================================================================

    /// Runs `continuation` once the operation finishes.
    ///
    /// Continuations queued before the terminal transition run in
    /// registration order on the winning thread. Registering on a finished
    /// operation runs the callback immediately on the calling thread. A
    /// panicking continuation is logged and does not affect the others.
    pub fn continue_with<F>(&self, continuation: F)
    where
        F: FnOnce(&Operation<T, E>) + Send + 'static,
    {
        let continuation: Continuation<T, E> = Box::new(continuation);

        let continuation = {
            let mut queue = lock(&self.shared.continuations);
            match queue.as_mut() {
                Some(queued) => {
                    queued.push(continuation);
                    return;
                }
                None => continuation,
            }
        };

        self.invoke(continuation);
    }

    fn invoke(&self, continuation: Continuation<T, E>) {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| continuation(self))) {
            error!(
                op_id = self.shared.id,
                panic = %panic_message(panic.as_ref()),
                "Operation continuation panicked"
            );
        }
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Returns the wait handle, creating it on first use.
    ///
    /// The status is re-checked after the handle is published: a winner that
    /// finished before the handle existed could not have signaled it.
    pub fn wait_handle(&self) -> &WaitHandle {
        let handle = self.shared.wait_handle.get_or_init(WaitHandle::default);
        fence(Ordering::SeqCst);
        if self.shared.state.load(Ordering::SeqCst) >= STATE_COMPLETED {
            handle.signal();
        }
        handle
    }

    /// Blocks the calling thread until the operation finishes.
    pub fn wait(&self) {
        if !self.is_done() {
            self.wait_handle().wait();
        }
    }

    /// Blocks up to `timeout`. Returns true if the operation finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.is_done() || self.wait_handle().wait_timeout(timeout)
    }

    /// Blocks until finished and returns the cloned outcome.
    pub fn join(&self) -> Result<T, OperationError<E>>
    where
        T: Clone,
        E: Clone,
    {
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            self.wait_handle().wait();
        }
    }

    /// Waits for the outcome without blocking the executor.
    pub async fn wait_async(&self) -> Result<T, OperationError<E>>
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }

        let (tx, rx) = oneshot::channel();
        self.continue_with(move |op| {
            if let Some(outcome) = op.outcome() {
                let _ = tx.send(outcome);
            }
        });

        rx.await.unwrap_or(Err(OperationError::Canceled))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
