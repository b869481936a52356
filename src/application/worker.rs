//! # Reconciliation Worker
//!
//! Loads the uploaded catalog, applies it through the store and publishes at
//! most one of `aborted` / `result` on the task's signal cell.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::application::coordinator::TaskSignals;
use crate::domain::{
    CatalogSource, CatalogStore, ParsedCatalog, ReconcileCounts, StorageError, TaskContext,
    TaskResult, TaskStats,
};

/// Everything a worker needs to process one upload
pub struct WorkerJob {
    pub merchant_id: i64,
    pub input: PathBuf,
    pub source: Arc<dyn CatalogSource>,
    pub store: Arc<dyn CatalogStore>,
}

pub async fn run_worker(job: WorkerJob, signals: Arc<TaskSignals>) {
    let ctx = signals.context();

    let catalog = match job.source.load(job.merchant_id, &job.input).await {
        Ok(catalog) => catalog,
        Err(e) => {
            error!(error = %e, input = %job.input.display(), "failed to load catalog");
            signals.notify_aborted();
            return;
        }
    };

    info!(
        total = catalog.total,
        to_upsert = catalog.to_upsert.len(),
        to_delete = catalog.to_delete.len(),
        ignored_at_parse = catalog.ignored,
        "catalog loaded"
    );

    let counts = match reconcile(job.store.as_ref(), &ctx, job.merchant_id, &catalog).await {
        Ok(counts) => counts,
        Err(e) if e.is_context() => {
            // the supervisor already resolved this task as canceled or timed out
            info!(reason = %e, "reconciliation stopped before commit");
            return;
        }
        Err(e) => {
            error!(error = %e, "reconciliation failed");
            signals.notify_aborted();
            return;
        }
    };

    let stats = TaskStats::from_counts(catalog.total, counts.inserted, counts.updated, counts.deleted);

    if let Err(reason) = ctx.ensure_alive() {
        debug!(%reason, "suppressing result of a task that is no longer live");
        return;
    }
    if !signals.notify_result(TaskResult::from_stats(stats)) {
        debug!("task was resolved before the result was published");
    }
}

/// Picks the store operation matching the shape of the batch
pub async fn reconcile(
    store: &dyn CatalogStore,
    ctx: &TaskContext,
    merchant_id: i64,
    catalog: &ParsedCatalog,
) -> Result<ReconcileCounts, StorageError> {
    match (catalog.to_upsert.is_empty(), catalog.to_delete.is_empty()) {
        (false, false) => {
            store
                .upsert_and_delete(ctx, &catalog.to_upsert, merchant_id, &catalog.to_delete)
                .await
        }
        (false, true) => {
            let (inserted, updated) = store.upsert(ctx, &catalog.to_upsert).await?;
            Ok(ReconcileCounts {
                inserted,
                updated,
                deleted: 0,
            })
        }
        (true, false) => {
            let deleted = store.delete(ctx, merchant_id, &catalog.to_delete).await?;
            Ok(ReconcileCounts {
                deleted,
                ..ReconcileCounts::default()
            })
        }
        (true, true) => Ok(ReconcileCounts::default()),
    }
}
