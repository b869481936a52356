//! # Reconciliation Task Definitions
//!
//! A task is one upload being reconciled in the background. Its state moves
//! from [`TaskState::Processing`] to exactly one terminal state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for reconciliation tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new unique task ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<TaskId> for Uuid {
    fn from(task_id: TaskId) -> Self {
        task_id.0
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Upload accepted, worker running
    Processing,
    /// Reconciliation committed and stats are available
    Done,
    /// Deadline elapsed before a result was published
    TimedOut,
    /// Explicitly canceled by a caller
    Canceled,
    /// Worker hit an I/O, parse or store error
    Aborted,
}

impl TaskState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Done => "Done",
            Self::TimedOut => "TimedOut",
            Self::Canceled => "Canceled",
            Self::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counters of a finished reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub ignored: u64,
}

impl TaskStats {
    /// Derives `ignored` as every processed row that did not change the table.
    #[must_use]
    pub const fn from_counts(total: u64, added: u64, updated: u64, removed: u64) -> Self {
        let applied = added.saturating_add(updated).saturating_add(removed);
        Self {
            added,
            updated,
            removed,
            ignored: total.saturating_sub(applied),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub stats: TaskStats,
    pub error: Option<String>,
}

impl TaskResult {
    #[must_use]
    pub const fn from_stats(stats: TaskStats) -> Self {
        Self { stats, error: None }
    }
}

/// Snapshot of a task as held by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub result: TaskResult,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    #[must_use]
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Processing,
            result: TaskResult::default(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Renders the polling status text.
    ///
    /// `State: <name>`, followed by a `Stats:` line once the task is done.
    #[must_use]
    pub fn status_text(&self) -> String {
        let mut text = format!("State: {}", self.state);
        if self.state == TaskState::Done {
            let stats = &self.result.stats;
            text.push_str(&format!(
                "\nStats: Added: {}, Updated: {}, Removed: {}, Ignored: {}",
                stats.added, stats.updated, stats.removed, stats.ignored
            ));
        }
        text
    }
}
