//! Repository interfaces for the catalog
//!
//! `CatalogStore` is the reconciliation + query contract the worker and the
//! HTTP layer depend on; `CatalogSource` turns an uploaded file into a batch.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::context::{ContextError, TaskContext};
use crate::domain::product::{Product, ProductFilter, ValidationError};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to encode staging rows: {0}")]
    Staging(#[from] csv::Error),

    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl StorageError {
    /// True when the error only reflects the task being stopped from outside
    #[must_use]
    pub const fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open workbook {path}: {message}")]
    Open { path: String, message: String },

    #[error("workbook {0} has no worksheets")]
    NoWorksheet(String),

    #[error("failed to read worksheet: {0}")]
    Read(String),

    #[error("parsing task panicked or was cancelled: {0}")]
    Join(String),
}

/// Rows written by one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// Reconciliation batch extracted from an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCatalog {
    pub to_upsert: Vec<Product>,
    pub to_delete: Vec<i64>,
    /// Data rows seen, valid or not
    pub total: u64,
    /// Rows rejected by cell validation
    pub ignored: u64,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inserts new keys and updates changed ones, returns `(inserted, updated)`
    async fn upsert(&self, ctx: &TaskContext, products: &[Product]) -> Result<(u64, u64), StorageError>;

    /// Deletes the merchant's offers, returns rows removed
    async fn delete(&self, ctx: &TaskContext, merchant_id: i64, offer_ids: &[i64]) -> Result<u64, StorageError>;

    /// Both of the above in one transaction
    async fn upsert_and_delete(
        &self,
        ctx: &TaskContext,
        products: &[Product],
        merchant_id: i64,
        offer_ids: &[i64],
    ) -> Result<ReconcileCounts, StorageError>;

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StorageError>;
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self, merchant_id: i64, input: &Path) -> Result<ParsedCatalog, SourceError>;
}
