//! # Task Registry
//!
//! Authoritative map from task id to task snapshot. The scheduler is the only
//! writer; any number of status readers may poll concurrently.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;

use crate::domain::{Task, TaskId, TaskResult, TaskState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("task {0} already exists")]
    DuplicateTask(TaskId),

    #[error("no such task: {0}")]
    NotFound(TaskId),

    #[error("task {id} can not move from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskState,
        to: TaskState,
    },
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new `Processing` task with a zeroed result
    pub fn create(&self, id: TaskId) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            return Err(RegistryError::DuplicateTask(id));
        }
        tasks.insert(id, Task::new(id));
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Result<Task, RegistryError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    #[must_use]
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.read().get(&id).map(|task| task.state)
    }

    /// One-shot transition out of `Processing`
    pub fn set_state(&self, id: TaskId, state: TaskState) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        Self::transition(task, state)
    }

    /// Stores the result of a task that is still `Processing`
    pub fn set_result(&self, id: TaskId, result: TaskResult) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        if task.state.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id,
                from: task.state,
                to: TaskState::Done,
            });
        }
        task.result = result;
        Ok(())
    }

    /// Records the result and the `Done` transition under one write lock
    pub fn complete(&self, id: TaskId, result: TaskResult) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        Self::transition(task, TaskState::Done)?;
        task.result = result;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    fn transition(task: &mut Task, to: TaskState) -> Result<(), RegistryError> {
        if task.state.is_terminal() || !to.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id: task.id,
                from: task.state,
                to,
            });
        }
        task.state = to;
        task.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStats;
    use std::sync::Arc;

    #[test]
    fn test_create_and_get() {
        let registry = TaskRegistry::new();
        let id = TaskId::new();
        registry.create(id).unwrap();

        let task = registry.get(id).unwrap();
        assert_eq!(task.state, TaskState::Processing);
        assert_eq!(task.result, TaskResult::default());
        assert!(task.finished_at.is_none());
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let registry = TaskRegistry::new();
        let id = TaskId::new();
        registry.create(id).unwrap();
        assert_eq!(registry.create(id), Err(RegistryError::DuplicateTask(id)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_task() {
        let registry = TaskRegistry::new();
        let id = TaskId::new();
        assert_eq!(registry.get(id), Err(RegistryError::NotFound(id)));
        assert_eq!(registry.set_state(id, TaskState::Done), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let registry = TaskRegistry::new();
        let id = TaskId::new();
        registry.create(id).unwrap();
        registry.set_state(id, TaskState::Canceled).unwrap();

        let err = registry.set_state(id, TaskState::Done).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { from: TaskState::Canceled, .. }));
        assert_eq!(registry.state(id), Some(TaskState::Canceled));
        assert!(registry.get(id).unwrap().finished_at.is_some());
    }

    #[test]
    fn test_processing_is_never_reentered() {
        let registry = TaskRegistry::new();
        let id = TaskId::new();
        registry.create(id).unwrap();
        assert!(registry.set_state(id, TaskState::Processing).is_err());
    }

    #[test]
    fn test_complete_sets_result_and_state_together() {
        let registry = TaskRegistry::new();
        let id = TaskId::new();
        registry.create(id).unwrap();

        let result = TaskResult::from_stats(TaskStats::from_counts(5, 2, 1, 1));
        registry.complete(id, result.clone()).unwrap();

        let task = registry.get(id).unwrap();
        assert_eq!(task.state, TaskState::Done);
        assert_eq!(task.result, result);
        assert!(registry.set_result(id, TaskResult::default()).is_err());
    }

    #[test]
    fn test_concurrent_readers_and_single_writer() {
        let registry = Arc::new(TaskRegistry::new());
        let id = TaskId::new();
        registry.create(id).unwrap();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut seen_terminal = false;
                    for _ in 0..1_000 {
                        let state = registry.state(id).unwrap();
                        // once terminal, never observed as Processing again
                        if seen_terminal {
                            assert_eq!(state, TaskState::Aborted);
                        }
                        seen_terminal |= state.is_terminal();
                    }
                })
            })
            .collect();

        registry.set_state(id, TaskState::Aborted).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
