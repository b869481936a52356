//! # Task Scheduler
//!
//! Creates tasks, launches their worker and supervises the outcome race.
//! The supervisor is the only code path that moves a task out of
//! `Processing`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use crate::application::coordinator::{Coordinator, Outcome, TaskSignals};
use crate::application::registry::{RegistryError, TaskRegistry};
use crate::application::worker::{WorkerJob, run_worker};
use crate::domain::{CatalogSource, CatalogStore, Task, TaskId, TaskState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no such task")]
    BadTaskId,

    #[error("task can not be canceled due to its current state")]
    CannotCancel,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Deadline of every task, measured from creation
    pub task_timeout: Duration,
    /// How long a cancel request waits for the supervisor to act on it
    pub cancel_ack_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(20),
            cancel_ack_timeout: Duration::from_secs(1),
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<TaskRegistry>,
    coordinator: Arc<Coordinator>,
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn CatalogStore>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            coordinator: Arc::new(Coordinator::new()),
            source,
            store,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    #[must_use]
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Schedules a new task and returns its id without waiting on processing
    pub fn new_task(&self, merchant_id: i64, input: PathBuf) -> Result<TaskId, SchedulerError> {
        let id = TaskId::new();
        self.new_task_with_id(id, merchant_id, input)?;
        Ok(id)
    }

    /// Schedules a task under an id the caller generated up front
    /// (the upload handler names the stored file after it).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new_task_with_id(
        &self,
        id: TaskId,
        merchant_id: i64,
        input: PathBuf,
    ) -> Result<(), SchedulerError> {
        let span = info_span!("task", task_id = %id, merchant_id);
        let _entered = span.enter();

        // Signals first: a `Processing` task must always have a live cell
        let deadline = Instant::now() + self.config.task_timeout;
        let signals = self
            .coordinator
            .register(id, deadline)
            .ok_or(RegistryError::DuplicateTask(id))?;
        if let Err(e) = self.registry.create(id) {
            self.coordinator.remove(id);
            return Err(e.into());
        }
        info!(input = %input.display(), timeout_secs = self.config.task_timeout.as_secs(), "task created");

        let job = WorkerJob {
            merchant_id,
            input,
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
        };
        tokio::spawn(run_worker(job, Arc::clone(&signals)).in_current_span());

        let registry = Arc::clone(&self.registry);
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(supervise(id, signals, registry, coordinator).in_current_span());
        Ok(())
    }

    pub fn task(&self, raw_id: &str) -> Result<Task, SchedulerError> {
        let id = parse_task_id(raw_id)?;
        self.registry.get(id).map_err(|_| SchedulerError::BadTaskId)
    }

    /// Status text as served to pollers
    pub fn read_task_status(&self, raw_id: &str) -> Result<String, SchedulerError> {
        self.task(raw_id).map(|task| task.status_text())
    }

    /// Requests cancellation and waits, bounded, for the supervisor to record it
    pub async fn cancel_task(&self, raw_id: &str) -> Result<(), SchedulerError> {
        let id = parse_task_id(raw_id)?;
        let state = self.registry.state(id).ok_or(SchedulerError::BadTaskId)?;
        if state != TaskState::Processing {
            return Err(SchedulerError::CannotCancel);
        }

        let signals = self.coordinator.get(id).ok_or(SchedulerError::CannotCancel)?;
        if !signals.request_cancel() {
            return Err(SchedulerError::CannotCancel);
        }
        info!(task_id = %id, "cancellation requested");

        if tokio::time::timeout(self.config.cancel_ack_timeout, signals.acknowledged())
            .await
            .is_err()
        {
            warn!(task_id = %id, "cancellation not yet acknowledged by supervisor");
        }
        Ok(())
    }
}

fn parse_task_id(raw_id: &str) -> Result<TaskId, SchedulerError> {
    raw_id.parse().map_err(|_| SchedulerError::BadTaskId)
}

async fn supervise(
    id: TaskId,
    signals: Arc<TaskSignals>,
    registry: Arc<TaskRegistry>,
    coordinator: Arc<Coordinator>,
) {
    let outcome = signals.await_outcome().await;

    let recorded = match outcome {
        Outcome::Done(result) => {
            info!(
                added = result.stats.added,
                updated = result.stats.updated,
                removed = result.stats.removed,
                ignored = result.stats.ignored,
                "task is done"
            );
            registry.complete(id, result)
        }
        other => {
            let state = other.state();
            info!(%state, "task finished without result");
            registry.set_state(id, state)
        }
    };
    if let Err(e) = recorded {
        warn!(error = %e, "failed to record task outcome");
    }

    signals.settle();
    coordinator.remove(id);
}
