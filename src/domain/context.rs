//! Execution context handed to a task's worker.
//!
//! Carries the task deadline and a cancellation token. The store checks it
//! right before committing so that a timed out or canceled task never
//! publishes its writes.

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("task is canceled")]
    Canceled,

    #[error("task deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct TaskContext {
    token: CancellationToken,
    deadline: Instant,
}

impl TaskContext {
    #[must_use]
    pub const fn new(token: CancellationToken, deadline: Instant) -> Self {
        Self { token, deadline }
    }

    /// Context without a practical deadline, for callers outside the scheduler
    #[must_use]
    pub fn detached() -> Self {
        Self::new(
            CancellationToken::new(),
            Instant::now() + std::time::Duration::from_secs(60 * 60 * 24 * 365),
        )
    }

    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the reason this context is no longer live, if any.
    ///
    /// The deadline is checked against the clock directly, so it holds even
    /// before the supervisor has observed the timeout.
    pub fn ensure_alive(&self) -> Result<(), ContextError> {
        if Instant::now() >= self.deadline {
            return Err(ContextError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Err(ContextError::Canceled);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.ensure_alive().is_ok()
    }
}
