//! Application layer module
//!
//! Task orchestration: registry, signal coordination, scheduling and the
//! worker that drives a reconciliation.

pub mod coordinator;
pub mod registry;
pub mod scheduler;
pub mod worker;

pub use coordinator::{Coordinator, Outcome, Signal, TaskSignals};
pub use registry::{RegistryError, TaskRegistry};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
pub use worker::{WorkerJob, reconcile, run_worker};
