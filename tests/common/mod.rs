//! Shared fixtures: an in-memory catalog store and a canned catalog source
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use catalog_sync_lib::application::{Scheduler, SchedulerConfig};
use catalog_sync_lib::domain::{
    CatalogSource, CatalogStore, ParsedCatalog, Product, ProductFilter, ReconcileCounts,
    SourceError, StorageError, Task, TaskContext, TaskId,
};

pub fn product(merchant_id: i64, offer_id: i64, name: &str, cents: i64, quantity: i64) -> Product {
    Product::new(merchant_id, offer_id, name, Decimal::new(cents, 2), quantity).unwrap()
}

type Key = (i64, i64);

/// Catalog store over a map, committing only while the task context is live
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<Key, Product>>,
    delay: Mutex<Option<Duration>>,
    fail: Mutex<bool>,
    commits: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, products: impl IntoIterator<Item = Product>) {
        let mut rows = self.rows.lock();
        for product in products {
            rows.insert(product.key(), product);
        }
    }

    /// Every write waits this long before trying to commit
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fail_writes(&self) {
        *self.fail.lock() = true;
    }

    pub fn snapshot(&self) -> Vec<Product> {
        self.rows.lock().values().cloned().collect()
    }

    pub fn commits(&self) -> usize {
        *self.commits.lock()
    }

    async fn stall(&self) -> Result<(), StorageError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock() {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn apply_upsert(rows: &mut BTreeMap<Key, Product>, products: &[Product]) -> Result<(u64, u64), StorageError> {
        let mut batch: BTreeMap<Key, Product> = BTreeMap::new();
        for product in products {
            product.validate()?;
            batch.insert(product.key(), product.clone());
        }

        let (mut inserted, mut updated) = (0, 0);
        for (key, product) in batch {
            match rows.get(&key) {
                None => inserted += 1,
                Some(existing) if *existing != product => updated += 1,
                Some(_) => continue,
            }
            rows.insert(key, product);
        }
        Ok((inserted, updated))
    }

    fn apply_delete(rows: &mut BTreeMap<Key, Product>, merchant_id: i64, offer_ids: &[i64]) -> u64 {
        offer_ids
            .iter()
            .filter(|offer_id| rows.remove(&(merchant_id, **offer_id)).is_some())
            .count() as u64
    }

    /// Applies `change` to a copy and swaps it in if the context is still live
    async fn transact<T>(
        &self,
        ctx: &TaskContext,
        change: impl FnOnce(&mut BTreeMap<Key, Product>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.stall().await?;

        let mut working = self.rows.lock().clone();
        let value = change(&mut working)?;
        ctx.ensure_alive()?;

        *self.rows.lock() = working;
        *self.commits.lock() += 1;
        Ok(value)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert(&self, ctx: &TaskContext, products: &[Product]) -> Result<(u64, u64), StorageError> {
        self.transact(ctx, |rows| Self::apply_upsert(rows, products)).await
    }

    async fn delete(&self, ctx: &TaskContext, merchant_id: i64, offer_ids: &[i64]) -> Result<u64, StorageError> {
        self.transact(ctx, |rows| Ok(Self::apply_delete(rows, merchant_id, offer_ids)))
            .await
    }

    async fn upsert_and_delete(
        &self,
        ctx: &TaskContext,
        products: &[Product],
        merchant_id: i64,
        offer_ids: &[i64],
    ) -> Result<ReconcileCounts, StorageError> {
        self.transact(ctx, |rows| {
            let (inserted, updated) = Self::apply_upsert(rows, products)?;
            let deleted = Self::apply_delete(rows, merchant_id, offer_ids);
            Ok(ReconcileCounts {
                inserted,
                updated,
                deleted,
            })
        })
        .await
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StorageError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|p| filter.merchant_id.is_none_or(|id| p.merchant_id == id))
            .filter(|p| filter.offer_id.is_none_or(|id| p.offer_id == id))
            .filter(|p| {
                filter
                    .name_prefix
                    .as_deref()
                    .is_none_or(|prefix| p.name.starts_with(prefix))
            })
            .cloned()
            .collect())
    }
}

/// Source that ignores the input file and hands back a fixed batch
pub struct StaticSource {
    catalog: Option<ParsedCatalog>,
}

impl StaticSource {
    pub fn new(catalog: ParsedCatalog) -> Arc<Self> {
        Arc::new(Self { catalog: Some(catalog) })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { catalog: None })
    }
}

#[async_trait]
impl CatalogSource for StaticSource {
    async fn load(&self, _merchant_id: i64, input: &Path) -> Result<ParsedCatalog, SourceError> {
        self.catalog.clone().ok_or_else(|| SourceError::Open {
            path: input.display().to_string(),
            message: "unreadable workbook".to_string(),
        })
    }
}

pub fn catalog(to_upsert: Vec<Product>, to_delete: Vec<i64>, ignored: u64) -> ParsedCatalog {
    let total = to_upsert.len() as u64 + to_delete.len() as u64 + ignored;
    ParsedCatalog {
        to_upsert,
        to_delete,
        total,
        ignored,
    }
}

pub fn scheduler(source: Arc<dyn CatalogSource>, store: Arc<dyn CatalogStore>) -> Arc<Scheduler> {
    let config = SchedulerConfig {
        task_timeout: Duration::from_secs(20),
        cancel_ack_timeout: Duration::from_secs(1),
    };
    Arc::new(Scheduler::new(config, source, store))
}

/// Polls until the task leaves `Processing`
pub async fn wait_terminal(scheduler: &Scheduler, id: TaskId) -> Task {
    for _ in 0..5_000 {
        let task = scheduler.task(&id.to_string()).unwrap();
        if task.state.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached a terminal state");
}
