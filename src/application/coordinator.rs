//! # Task Signal Coordination
//!
//! Each running task owns one [`TaskSignals`] cell. Cancellation, abort,
//! result and timeout all race to move the cell out of `Pending`; the first
//! compare-and-swap wins and every later signal is rejected. The supervising
//! loop waits on the cell with [`TaskSignals::await_outcome`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{TaskContext, TaskId, TaskResult, TaskState};

/// Current value of a task's signal cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Pending,
    CancelRequested,
    Aborted,
    Completed(TaskResult),
    TimedOut,
}

impl Signal {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(TaskResult),
    TimedOut,
    Canceled,
    Aborted,
}

impl Outcome {
    #[must_use]
    pub const fn state(&self) -> TaskState {
        match self {
            Self::Done(_) => TaskState::Done,
            Self::TimedOut => TaskState::TimedOut,
            Self::Canceled => TaskState::Canceled,
            Self::Aborted => TaskState::Aborted,
        }
    }
}

/// Single-assignment signal cell for one task
#[derive(Debug)]
pub struct TaskSignals {
    cell: watch::Sender<Signal>,
    token: CancellationToken,
    settled: CancellationToken,
    deadline: Instant,
}

impl TaskSignals {
    #[must_use]
    pub fn new(deadline: Instant) -> Self {
        let (cell, _) = watch::channel(Signal::Pending);
        Self {
            cell,
            token: CancellationToken::new(),
            settled: CancellationToken::new(),
            deadline,
        }
    }

    /// Execution context for the worker; its token is cancelled as soon as a
    /// cancel or timeout wins the cell.
    #[must_use]
    pub fn context(&self) -> TaskContext {
        TaskContext::new(self.token.clone(), self.deadline)
    }

    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    #[must_use]
    pub fn current(&self) -> Signal {
        self.cell.borrow().clone()
    }

    /// Returns `true` if this request is the one that will cancel the task
    pub fn request_cancel(&self) -> bool {
        self.resolve(Signal::CancelRequested)
    }

    pub fn notify_aborted(&self) -> bool {
        self.resolve(Signal::Aborted)
    }

    pub fn notify_result(&self, result: TaskResult) -> bool {
        self.resolve(Signal::Completed(result))
    }

    /// Resolves once the supervisor has recorded the outcome
    pub async fn acknowledged(&self) {
        self.settled.cancelled().await;
    }

    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.settled.is_cancelled()
    }

    /// Marks the outcome as recorded, releasing [`Self::acknowledged`] waiters
    pub fn settle(&self) {
        self.settled.cancel();
    }

    /// Waits for the first of: deadline, cancel, abort, result.
    ///
    /// The deadline branch goes through the same compare-and-swap as the
    /// other signals, so a signal landing at the same instant still decides
    /// the outcome on its own.
    pub async fn await_outcome(&self) -> Outcome {
        let mut rx = self.cell.subscribe();
        let signalled = tokio::select! {
            changed = rx.wait_for(|signal| !signal.is_pending()) => changed.is_ok(),
            () = tokio::time::sleep_until(self.deadline) => false,
        };
        if !signalled {
            self.resolve(Signal::TimedOut);
        }

        let outcome = match self.current() {
            Signal::Completed(result) => Outcome::Done(result),
            Signal::Aborted => Outcome::Aborted,
            Signal::CancelRequested => Outcome::Canceled,
            Signal::TimedOut | Signal::Pending => Outcome::TimedOut,
        };

        // Stops cooperative work
        self.token.cancel();
        outcome
    }

    fn resolve(&self, signal: Signal) -> bool {
        let stops_worker = matches!(signal, Signal::CancelRequested | Signal::TimedOut);
        let won = self.cell.send_if_modified(|current| {
            if current.is_pending() {
                *current = signal;
                true
            } else {
                false
            }
        });
        // Before the winner returns, so no commit point can still pass
        if won && stops_worker {
            self.token.cancel();
        }
        won
    }
}

/// Lock-protected map of live tasks' signal cells
#[derive(Debug, Default)]
pub struct Coordinator {
    signals: Mutex<HashMap<TaskId, Arc<TaskSignals>>>,
}

impl Coordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh cell, or returns `None` if `id` is already live
    pub fn register(&self, id: TaskId, deadline: Instant) -> Option<Arc<TaskSignals>> {
        let signals = Arc::new(TaskSignals::new(deadline));
        match self.signals.lock().entry(id) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&signals));
            }
        }
        debug!(task_id = %id, "registered task signals");
        Some(signals)
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<Arc<TaskSignals>> {
        self.signals.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: TaskId) {
        if self.signals.lock().remove(&id).is_some() {
            debug!(task_id = %id, "deregistered task signals");
        }
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.signals.lock().len()
    }
}
