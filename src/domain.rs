//! Domain module - Core business entities and contracts
//!
//! This module contains the catalog entities, the task lifecycle types and
//! the repository/source traits the application layer depends on.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod context;
pub mod product;
pub mod repositories;
pub mod task;

// Re-export commonly used items for convenience
pub use context::{ContextError, TaskContext};
pub use product::{MAX_NAME_LEN, PRICE_SCALE, Product, ProductFilter, ValidationError};
pub use repositories::{
    CatalogSource, CatalogStore, ParsedCatalog, ReconcileCounts, SourceError, StorageError,
};
pub use task::{Task, TaskId, TaskResult, TaskState, TaskStats};
