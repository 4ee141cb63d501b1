//! # Owner-Thread Dispatch
//!
//! The store expects to be driven from a single owner thread (the game or
//! UI loop). Receipt validators may finish on any thread, so the transaction
//! processor hands the rest of its work back to the owner through an
//! [`OwnerDispatcher`].
//!
//! ## Queue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  validator thread            QueueDispatcher             owner thread   │
//! │  ────────────────            ───────────────             ────────────   │
//! │  verdict ready ──post(task)──► unbounded mpsc ──► run_pending() / run() │
//! │                                                    └─ confirm + notify  │
//! │                                                                         │
//! │  InlineDispatcher: runs the task on the posting thread (tests, hosts   │
//! │  whose state is already thread-safe).                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use iap_core::operation::panic_message;

/// Work to run on the owner thread.
pub type OwnerTask = Box<dyn FnOnce() + Send + 'static>;

/// Re-marshals work onto the owner thread.
pub trait OwnerDispatcher: Send + Sync {
    fn post(&self, task: OwnerTask);
}

// =============================================================================
// Inline Dispatcher
// =============================================================================

/// Runs every task immediately on the posting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl OwnerDispatcher for InlineDispatcher {
    fn post(&self, task: OwnerTask) {
        run_guarded(task);
    }
}

// =============================================================================
// Queue Dispatcher
// =============================================================================

/// Posts tasks to an [`OwnerQueue`] drained by the owner thread.
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<OwnerTask>,
}

/// Receiving end of a [`QueueDispatcher`].
#[derive(Debug)]
pub struct OwnerQueue {
    rx: mpsc::UnboundedReceiver<OwnerTask>,
}

impl QueueDispatcher {
    /// Creates a dispatcher and the queue the owner thread drains.
    pub fn new() -> (Self, OwnerQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (QueueDispatcher { tx }, OwnerQueue { rx })
    }
}

impl OwnerDispatcher for QueueDispatcher {
    fn post(&self, task: OwnerTask) {
        if self.tx.send(task).is_err() {
            warn!("Owner queue is closed, dropping task");
        }
    }
}

impl OwnerQueue {
    /// Runs every task queued so far. Call once per frame from the owner
    /// thread. Returns the number of tasks run.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            run_guarded(task);
            ran += 1;
        }
        if ran > 0 {
            debug!(count = ran, "Ran owner-thread tasks");
        }
        ran
    }

    /// Runs tasks as they arrive until every dispatcher is dropped.
    ///
    /// Use when the owner is a tokio task rather than a frame loop.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            run_guarded(task);
        }
        debug!("Owner queue closed");
    }
}

fn run_guarded(task: OwnerTask) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(panic = %panic_message(panic.as_ref()), "Owner-thread task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_dispatcher_runs_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        InlineDispatcher.post(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queue_runs_only_when_pumped() {
        let (dispatcher, mut queue) = QueueDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = calls.clone();
            dispatcher.post(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(queue.run_pending(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_stop_queue() {
        let (dispatcher, mut queue) = QueueDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        dispatcher.post(Box::new(|| panic!("bad task")));
        let counter = calls.clone();
        dispatcher.post(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_drains_until_dispatchers_dropped() {
        let (dispatcher, queue) = QueueDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        dispatcher.post(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        drop(dispatcher);

        queue.run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
